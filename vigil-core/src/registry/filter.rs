use super::Registry;
use crate::envelope::Labels;
use crate::resource::{Resource, ResourceKind, ResourceStatus};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Filter criteria. Populated criteria combine with AND, values inside one
/// criterion with OR; an empty criterion matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceFilter {
    pub kinds: Vec<ResourceKind>,
    pub groups: Vec<String>,
    pub statuses: Vec<ResourceStatus>,
    pub environments: Vec<String>,
    pub owners: Vec<String>,
    /// Every key must be present with exactly this value.
    pub labels: Labels,
    pub tags: Labels,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen_since: Option<OffsetDateTime>,
}

impl ResourceFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, r: &Resource) -> bool {
        any_or_empty(&self.kinds, &r.kind)
            && any_or_empty(&self.groups, &r.group)
            && any_or_empty(&self.statuses, &r.status)
            && any_or_empty(&self.environments, &r.environment)
            && any_or_empty(&self.owners, &r.owner)
            && contains_all(&r.labels, &self.labels)
            && contains_all(&r.tags, &self.tags)
            && self.last_seen_since.map_or(true, |since| r.last_seen >= since)
    }

    pub fn kind(mut self, kind: ResourceKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn status(mut self, status: ResourceStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.environments.push(env.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

fn any_or_empty<T: PartialEq>(wanted: &[T], actual: &T) -> bool {
    wanted.is_empty() || wanted.contains(actual)
}

fn contains_all(actual: &Labels, wanted: &Labels) -> bool {
    wanted.iter().all(|(k, v)| actual.get(k) == Some(v))
}

impl Registry {
    /// Matching records, most recently seen first.
    pub fn filter(&self, criteria: &ResourceFilter) -> Vec<Resource> {
        let mut out: Vec<Resource> = self.snapshot().into_iter().filter(|r| criteria.matches(r)).collect();
        sort_by_recency(&mut out);
        out
    }
}

pub(super) fn sort_by_recency(resources: &mut [Resource]) {
    resources.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.id.cmp(&b.id)));
}
