//! Ingest pipeline: one envelope in, registry records out.
//!
//! Ties the identity resolver, namespace classifier and label reconciler to
//! the registry. The reporting agent is upserted as the hierarchy root, hosts
//! hang off their agent, containers off their host, apps off whichever of the
//! two they run in.

use crate::envelope::{first_non_empty, Envelope, Labels};
use crate::events::RegistryEvent;
use crate::identity::{Identity, UNKNOWN_IDENTITY};
use crate::labels::{log_observation_labels, standard_labels, JOB_AGENT};
use crate::namespace::classify;
use crate::registry::SharedRegistry;
use crate::resource::{Resource, ResourceKind, ResourceStatus, ResourceUpdate};
use serde::Serialize;
use tracing::debug;

/// Envelope fields copied verbatim into annotations when present.
const ANNOTATED: &[&str] = &[
    "region",
    "availability_zone",
    "instance_id",
    "instance_type",
    "image",
    "node_name",
    "kernel_version",
    "virtualization_system",
    "platform_family",
    "service_id",
];

/// Outcome of one observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observed {
    pub resource: Resource,
    /// The reporting agent, when the envelope named one.
    pub agent: Option<Resource>,
    /// Namespace classification of the envelope ("AWS/EC2", "System"...).
    pub namespace: String,
}

#[derive(Clone)]
pub struct Ingestor {
    registry: SharedRegistry,
}

impl Ingestor {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Metric or trace envelope.
    pub fn observe(&self, env: &Envelope) -> Observed {
        self.ingest(env, standard_labels(env))
    }

    /// Log envelope: log-specific labels join the standard ones. Free-form
    /// labels and extras never claim a key from either set.
    pub fn observe_log(&self, env: &Envelope) -> Observed {
        self.ingest(env, log_observation_labels(env))
    }

    fn ingest(&self, env: &Envelope, labels: Labels) -> Observed {
        let namespace = classify(env);
        let agent = self.observe_agent(env);
        let agent_id = agent.as_ref().map(|a| a.id.clone()).unwrap_or_default();

        let target = self.target(env, &agent_id);
        let resource = match (&agent, target.kind) {
            // The envelope was the agent's own heartbeat.
            (Some(agent), ResourceKind::Agent) => agent.clone(),
            _ => {
                let update = describe(env, target.kind, &namespace, target.parent_id, &target.identity);
                self.registry.upsert(&target.id, target.kind, update, labels)
            }
        };

        Observed { resource, agent, namespace }
    }

    fn observe_agent(&self, env: &Envelope) -> Option<Resource> {
        if env.agent_id.is_empty() {
            return None;
        }
        let id = agent_resource_id(&env.agent_id);
        let mut labels = Labels::new();
        labels.insert("agent_id".into(), env.agent_id.clone());
        labels.insert("job".into(), JOB_AGENT.into());
        for (key, value) in [("agent_version", &env.agent_version), ("hostname", &env.hostname)] {
            if !value.is_empty() {
                labels.insert(key.into(), value.clone());
            }
        }
        let update = ResourceUpdate {
            name: first_non_empty(&[&env.hostname, &env.agent_id]).to_string(),
            display_name: format!("{JOB_AGENT}@{}", first_non_empty(&[&env.hostname, &env.agent_id])),
            version: env.agent_version.clone(),
            os: env.os.clone(),
            arch: env.architecture.clone(),
            ip_address: env.ip_address.clone(),
            resource_type: "agent".into(),
            ..Default::default()
        };
        Some(self.registry.upsert(&id, ResourceKind::Agent, update, labels))
    }

    /// Kind, ID and parent of the entity the envelope describes.
    fn target(&self, env: &Envelope, agent_id: &str) -> Target {
        let identity = Identity::of(env);
        let host_id = match Identity::host_of(env) {
            host if host.is_unknown() => String::new(),
            host => host.to_string(),
        };

        match requested_kind(env) {
            Some(ResourceKind::Agent) if !agent_id.is_empty() => Target {
                kind: ResourceKind::Agent,
                id: agent_id.to_string(),
                parent_id: String::new(),
                identity,
            },
            Some(ResourceKind::App) if !env.service_label().is_empty() => {
                let parent_id = match &identity {
                    Identity::Container { .. } => identity.to_string(),
                    _ => host_id,
                };
                let id = non_empty_or(&env.resource_id, || {
                    let mut identifying = Labels::new();
                    identifying.insert("parent".into(), parent_id.clone());
                    identifying.insert("service".into(), env.service_label().to_string());
                    Resource::derive_id(ResourceKind::App, &identifying)
                });
                Target { kind: ResourceKind::App, id, parent_id, identity }
            }
            Some(ResourceKind::Syslog) => {
                let id = non_empty_or(&env.resource_id, || {
                    let mut identifying = Labels::new();
                    identifying.insert("hostname".into(), env.hostname.clone());
                    identifying.insert("ip_address".into(), env.ip_address.clone());
                    Resource::derive_id(ResourceKind::Syslog, &identifying)
                });
                Target { kind: ResourceKind::Syslog, id, parent_id: String::new(), identity }
            }
            Some(ResourceKind::Host) if !host_id.is_empty() => Target {
                kind: ResourceKind::Host,
                id: host_id,
                parent_id: agent_id.to_string(),
                identity: Identity::host_of(env),
            },
            _ => self.by_identity(env, identity, host_id, agent_id),
        }
    }

    fn by_identity(&self, env: &Envelope, identity: Identity, host_id: String, agent_id: &str) -> Target {
        match identity.kind() {
            Some(ResourceKind::Container) => Target {
                kind: ResourceKind::Container,
                id: identity.to_string(),
                parent_id: non_empty_or(&host_id, || agent_id.to_string()),
                identity,
            },
            Some(kind) => Target {
                kind,
                id: identity.to_string(),
                parent_id: agent_id.to_string(),
                identity,
            },
            None => {
                self.registry.emit(RegistryEvent::IdentityIndeterminate {
                    hostname: env.hostname.clone(),
                    agent_id: env.agent_id.clone(),
                });
                Target {
                    kind: ResourceKind::Host,
                    id: UNKNOWN_IDENTITY.to_string(),
                    parent_id: String::new(),
                    identity,
                }
            }
        }
    }
}

struct Target {
    kind: ResourceKind,
    id: String,
    parent_id: String,
    identity: Identity,
}

/// ID of the agent resource for `agent_id`.
pub fn agent_resource_id(agent_id: &str) -> String {
    let mut identifying = Labels::new();
    identifying.insert("agent_id".into(), agent_id.to_string());
    Resource::derive_id(ResourceKind::Agent, &identifying)
}

fn requested_kind(env: &Envelope) -> Option<ResourceKind> {
    if env.kind.trim().is_empty() {
        return None;
    }
    match env.kind.parse() {
        Ok(kind) => Some(kind),
        Err(err) => {
            debug!(kind = %env.kind, %err, "ignoring kind hint");
            None
        }
    }
}

fn status_hint(env: &Envelope) -> Option<ResourceStatus> {
    if env.status.trim().is_empty() {
        return None;
    }
    env.status
        .parse()
        .map_err(|err| debug!(status = %env.status, %err, "ignoring status hint"))
        .ok()
}

fn non_empty_or(value: &str, fallback: impl FnOnce() -> String) -> String {
    if value.is_empty() {
        fallback()
    } else {
        value.to_string()
    }
}

fn describe(env: &Envelope, kind: ResourceKind, namespace: &str, parent_id: String, identity: &Identity) -> ResourceUpdate {
    let name = match kind {
        ResourceKind::App => env.service_label(),
        ResourceKind::Host => first_non_empty(&[&env.hostname, &env.instance_id]),
        _ => env.instance_name(),
    };
    let resource_type = match (kind, identity) {
        (ResourceKind::Host, Identity::Cloud { .. }) => "vm",
        (ResourceKind::Host, _) => "bare-metal",
        (ResourceKind::Container, _) if !env.pod_name.is_empty() => "pod",
        (ResourceKind::Container, _) => "container",
        (ResourceKind::App, _) => "service",
        (ResourceKind::Syslog, _) => "syslog",
        (ResourceKind::Agent, _) => "agent",
    };
    let version = match kind {
        ResourceKind::App => first_non_empty(&[&env.version, &env.app_version]),
        ResourceKind::Host => first_non_empty(&[&env.platform_version, &env.os_version]),
        ResourceKind::Container => first_non_empty(&[&env.version, &env.runtime_version]),
        _ => env.version.as_str(),
    };

    let provider = env.provider();
    ResourceUpdate {
        name: name.to_string(),
        display_name: env.labels.get("display_name").cloned().unwrap_or_default(),
        group: non_empty_or(&env.group, || namespace.to_string()),
        parent_id,
        location: first_non_empty(&[&env.location, &env.availability_zone, &env.region]).to_string(),
        environment: env.environment.clone(),
        owner: env.owner.clone(),
        platform: non_empty_or(&provider, || env.platform.clone()),
        runtime: env.runtime_name.clone(),
        version: version.to_string(),
        os: env.os.clone(),
        arch: env.architecture.clone(),
        ip_address: env.ip_address.clone(),
        resource_type: resource_type.to_string(),
        cluster: env.cluster_name.clone(),
        namespace: env.namespace.clone(),
        annotations: annotations(env),
        status: status_hint(env),
    }
}

fn annotations(env: &Envelope) -> Labels {
    let values = [
        &env.region,
        &env.availability_zone,
        &env.instance_id,
        &env.instance_type,
        &env.container_image_name,
        &env.node_name,
        &env.kernel_version,
        &env.virtualization_system,
        &env.platform_family,
        &env.service_id,
    ];
    ANNOTATED
        .iter()
        .zip(values)
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::RecordingSink;
    use crate::registry::Registry;
    use std::sync::Arc;
    use time::macros::datetime;

    fn ingestor() -> (Ingestor, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let registry = Registry::default()
            .with_clock(Arc::new(ManualClock::new(datetime!(2025-06-01 12:00 UTC))))
            .with_sink(sink.clone());
        (Ingestor::new(Arc::new(registry)), sink)
    }

    fn bare_metal() -> Envelope {
        Envelope {
            agent_id: "agent-1".into(),
            agent_version: "0.4.2".into(),
            hostname: "web1".into(),
            ip_address: "10.0.0.5".into(),
            os: "linux".into(),
            architecture: "amd64".into(),
            ..Default::default()
        }
    }

    #[test]
    fn host_hangs_off_its_agent() {
        let (ing, _) = ingestor();
        let out = ing.observe(&bare_metal());

        assert_eq!(out.resource.id, "host-web1-10-0-0-5");
        assert_eq!(out.resource.kind, ResourceKind::Host);
        assert_eq!(out.resource.resource_type, "bare-metal");
        assert_eq!(out.namespace, "System");
        assert_eq!(out.resource.group, "System");

        let agent = out.agent.unwrap();
        assert_eq!(agent.id, agent_resource_id("agent-1"));
        assert_eq!(out.resource.parent_id, agent.id);
        assert_eq!(agent.labels["job"], JOB_AGENT);
        assert_eq!(ing.registry().children(&agent.id).len(), 1);
    }

    #[test]
    fn container_hangs_off_its_host() {
        let (ing, _) = ingestor();
        ing.observe(&bare_metal());
        let env = Envelope {
            container_id: "abcdef0123456789".into(),
            container_name: "nginx".into(),
            container_image_name: "nginx:1.27".into(),
            runtime_name: "podman".into(),
            ..bare_metal()
        };
        let out = ing.observe(&env);

        assert_eq!(out.resource.id, "container-web1-abcdef012345");
        assert_eq!(out.resource.parent_id, "host-web1-10-0-0-5");
        assert_eq!(out.resource.name, "nginx");
        assert_eq!(out.resource.runtime, "podman");
        assert_eq!(out.resource.annotations["image"], "nginx:1.27");
        assert_eq!(out.namespace, "Podman");
        assert!(ing.registry().orphans().is_empty());
    }

    #[test]
    fn cloud_host_is_annotated() {
        let (ing, _) = ingestor();
        let env = Envelope {
            cloud_provider: "AWS".into(),
            account_id: "123".into(),
            instance_id: "i-9".into(),
            region: "us-east-1".into(),
            instance_type: "t3.micro".into(),
            ..bare_metal()
        };
        let out = ing.observe(&env);
        assert_eq!(out.resource.id, "aws-123-i-9");
        assert_eq!(out.resource.platform, "aws");
        assert_eq!(out.resource.resource_type, "vm");
        assert_eq!(out.resource.location, "us-east-1");
        assert_eq!(out.resource.annotations["instance_type"], "t3.micro");
        assert_eq!(out.namespace, "AWS/EC2");
    }

    #[test]
    fn app_hint_links_to_container() {
        let (ing, _) = ingestor();
        let env = Envelope {
            kind: "app".into(),
            service_name: "checkout".into(),
            version: "2.1.0".into(),
            container_id: "abcdef0123456789".into(),
            ..bare_metal()
        };
        let out = ing.observe(&env);
        assert_eq!(out.resource.kind, ResourceKind::App);
        assert!(out.resource.id.starts_with("app-"));
        assert_eq!(out.resource.name, "checkout");
        assert_eq!(out.resource.version, "2.1.0");
        assert_eq!(out.resource.parent_id, "container-web1-abcdef012345");

        let again = ing.observe(&env);
        assert_eq!(again.resource.id, out.resource.id);
    }

    #[test]
    fn log_free_form_cannot_claim_log_keys() {
        let (ing, _) = ingestor();
        let env = Envelope {
            app_name: "sshd".into(),
            labels: [("app_name".to_string(), "evil".to_string())].into_iter().collect(),
            ..bare_metal()
        };
        let out = ing.observe_log(&env);
        assert_eq!(out.resource.labels["app_name"], "sshd");
        assert_eq!(out.resource.labels["hostname"], "web1");
    }

    #[test]
    fn indeterminate_identity_uses_sentinel() {
        let (ing, sink) = ingestor();
        let out = ing.observe(&Envelope { hostname: "lonely".into(), ..Default::default() });
        assert_eq!(out.resource.id, UNKNOWN_IDENTITY);
        assert!(out.agent.is_none());
        assert_eq!(sink.count(|e| matches!(e, RegistryEvent::IdentityIndeterminate { .. })), 1);
    }

    #[test]
    fn status_hint_is_applied_and_bad_hint_ignored() {
        let (ing, _) = ingestor();
        let idle = Envelope { status: "Idle".into(), ..bare_metal() };
        assert_eq!(ing.observe(&idle).resource.status, ResourceStatus::Idle);
        let bogus = Envelope { status: "sleepy".into(), ..bare_metal() };
        assert_eq!(ing.observe(&bogus).resource.status, ResourceStatus::Online);
    }

    #[test]
    fn agent_heartbeat_records_agent_only() {
        let (ing, _) = ingestor();
        let out = ing.observe(&Envelope { kind: "agent".into(), ..bare_metal() });
        assert_eq!(out.resource.kind, ResourceKind::Agent);
        assert_eq!(ing.registry().len(), 1);
    }

    #[test]
    fn log_labels_join_standard_labels() {
        let (ing, _) = ingestor();
        let env = Envelope { app_name: "sshd".into(), event_id: "4625".into(), ..bare_metal() };
        let out = ing.observe_log(&env);
        assert_eq!(out.resource.labels["hostname"], "web1");
        assert_eq!(out.resource.labels["app_name"], "sshd");
        assert_eq!(out.resource.labels["event_id"], "4625");
    }

    #[test]
    fn syslog_source_stands_alone() {
        let (ing, _) = ingestor();
        let env = Envelope {
            kind: "syslog".into(),
            hostname: "router1".into(),
            ip_address: "10.0.0.1".into(),
            ..Default::default()
        };
        let out = ing.observe(&env);
        assert_eq!(out.resource.kind, ResourceKind::Syslog);
        assert!(out.resource.parent_id.is_empty());
    }
}
