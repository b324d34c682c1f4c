//! Canonical entity record and its closed enumerations.
//!
//! Hierarchy: `agent → host → container → app` or `agent → host → app`;
//! syslog sources stand alone. Parents are referenced by ID only, the registry
//! owns the parent → children index.

use crate::envelope::Labels;
use crate::error::RegistryError;
use crate::labels::merged_view;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Agent,
    Host,
    Container,
    App,
    Syslog,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [Self::Agent, Self::Host, Self::Container, Self::App, Self::Syslog];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Host => "host",
            Self::Container => "container",
            Self::App => "app",
            Self::Syslog => "syslog",
        }
    }

    /// Roots never carry a parent.
    pub fn is_root(&self) -> bool {
        matches!(self, Self::Agent | Self::Syslog)
    }

    /// Whether a resource of this kind may be the parent of `child`.
    pub fn accepts_child(&self, child: ResourceKind) -> bool {
        matches!(
            (self, child),
            (Self::Agent, Self::Host)
                | (Self::Agent, Self::Container)
                | (Self::Host, Self::Container)
                | (Self::Host, Self::App)
                | (Self::Container, Self::App)
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| RegistryError::UnknownKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Online,
    Offline,
    Idle,
    #[default]
    Unknown,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Idle => "idle",
            Self::Unknown => "unknown",
        }
    }

    /// Only live states age into `offline`; `unknown` was never observed as up.
    pub fn can_go_stale(&self) -> bool {
        matches!(self, Self::Online | Self::Idle)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "idle" => Ok(Self::Idle),
            "unknown" => Ok(Self::Unknown),
            _ => Err(RegistryError::UnknownStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub kind: ResourceKind,
    pub name: String,
    pub display_name: String,
    pub group: String,
    pub parent_id: String,

    pub labels: Labels,
    pub tags: Labels,
    pub annotations: Labels,

    pub status: ResourceStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,

    pub location: String,
    pub environment: String,
    pub owner: String,
    pub platform: String,
    pub runtime: String,
    pub version: String,
    pub os: String,
    pub arch: String,
    pub ip_address: String,
    pub resource_type: String,
    pub cluster: String,
    pub namespace: String,

    /// A persistence write is owed. Never serialized.
    #[serde(skip)]
    pub updated: bool,
    /// Bumped on every change; lets a writer tell whether its copy is current.
    #[serde(skip)]
    pub revision: u64,
}

/// Fields resolved from one observation. Empty strings mean "not reported".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceUpdate {
    pub name: String,
    pub display_name: String,
    pub group: String,
    pub parent_id: String,
    pub location: String,
    pub environment: String,
    pub owner: String,
    pub platform: String,
    pub runtime: String,
    pub version: String,
    pub os: String,
    pub arch: String,
    pub ip_address: String,
    pub resource_type: String,
    pub cluster: String,
    pub namespace: String,
    pub annotations: Labels,
    /// Explicit status reported with the observation.
    pub status: Option<ResourceStatus>,
}

impl Resource {
    pub fn new(id: impl Into<String>, kind: ResourceKind, now: OffsetDateTime) -> Self {
        Self {
            id: id.into(),
            kind,
            name: String::new(),
            display_name: String::new(),
            group: String::new(),
            parent_id: String::new(),
            labels: Labels::new(),
            tags: Labels::new(),
            annotations: Labels::new(),
            status: ResourceStatus::Unknown,
            last_seen: now,
            first_seen: now,
            created_at: now,
            updated_at: now,
            location: String::new(),
            environment: String::new(),
            owner: String::new(),
            platform: String::new(),
            runtime: String::new(),
            version: String::new(),
            os: String::new(),
            arch: String::new(),
            ip_address: String::new(),
            resource_type: String::new(),
            cluster: String::new(),
            namespace: String::new(),
            updated: false,
            revision: 0,
        }
    }

    /// `<kind>-<12 hex chars of blake3(sorted identifying labels)>`.
    pub fn derive_id(kind: ResourceKind, identifying: &Labels) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_str().as_bytes());
        for (key, value) in identifying {
            hasher.update(b"\n");
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        let hex = hasher.finalize().to_hex();
        format!("{kind}-{}", &hex.as_str()[..12])
    }

    /// Descriptive fields: last write wins, an empty value never blanks a field.
    /// `parent_id` is left to the registry, which owns the hierarchy index.
    pub fn apply(&mut self, update: &ResourceUpdate) {
        let pairs: [(&mut String, &String); 15] = [
            (&mut self.name, &update.name),
            (&mut self.display_name, &update.display_name),
            (&mut self.group, &update.group),
            (&mut self.location, &update.location),
            (&mut self.environment, &update.environment),
            (&mut self.owner, &update.owner),
            (&mut self.platform, &update.platform),
            (&mut self.runtime, &update.runtime),
            (&mut self.version, &update.version),
            (&mut self.os, &update.os),
            (&mut self.arch, &update.arch),
            (&mut self.ip_address, &update.ip_address),
            (&mut self.resource_type, &update.resource_type),
            (&mut self.cluster, &update.cluster),
            (&mut self.namespace, &update.namespace),
        ];
        for (field, value) in pairs {
            if !value.is_empty() {
                field.clone_from(value);
            }
        }
        for (key, value) in &update.annotations {
            self.annotations.insert(key.clone(), value.clone());
        }
    }

    /// Labels and tags as consumers see them; labels win on collision.
    pub fn merged_labels(&self) -> Labels {
        merged_view(&self.labels, &self.tags)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_empty()
    }

    /// Moves `last_seen` / `updated_at` forward, never backwards.
    pub(crate) fn touch(&mut self, now: OffsetDateTime) {
        if now > self.last_seen {
            self.last_seen = now;
        }
        self.mark_changed(now);
    }

    pub(crate) fn mark_changed(&mut self, now: OffsetDateTime) {
        if now > self.updated_at {
            self.updated_at = now;
        }
        self.updated = true;
        self.revision += 1;
    }
}
