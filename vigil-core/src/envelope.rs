//! Metadata envelope carried by every observation (metric, log or trace batch).
//!
//! The envelope is produced by agents, cloud collectors and container runtimes
//! and is read-only for the core. Absent fields deserialize to empty strings so
//! every rule downstream only has to ask "is it non-empty?".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered string map used for labels, tags and annotations.
pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    // --- Agent / host / endpoint ---
    pub agent_id: String,
    pub agent_version: String,
    pub host_id: String,
    pub endpoint_id: String,
    pub resource_id: String,
    /// Explicit kind hint ("host", "container", "app"...).
    pub kind: String,
    pub hostname: String,
    pub ip_address: String,
    pub os: String,
    pub os_version: String,
    pub platform: String,
    pub platform_family: String,
    pub platform_version: String,
    pub architecture: String,
    pub kernel_version: String,
    pub virtualization_system: String,

    // --- Cloud ---
    pub cloud_provider: String,
    pub region: String,
    pub availability_zone: String,
    pub instance_id: String,
    pub instance_type: String,
    pub account_id: String,
    pub project_id: String,
    pub resource_group: String,
    pub service_id: String,

    // --- Container / orchestration ---
    pub container_id: String,
    pub container_name: String,
    pub container_image_name: String,
    pub pod_name: String,
    pub namespace: String,
    pub cluster_name: String,
    pub node_name: String,
    pub runtime_name: String,
    pub runtime_version: String,

    // --- Application / deployment ---
    pub application: String,
    pub environment: String,
    pub service: String,
    pub service_name: String,
    pub version: String,
    pub owner: String,
    pub group: String,
    pub location: String,

    // --- Log specific ---
    pub app_name: String,
    pub app_version: String,
    pub unit: String,
    pub event_id: String,
    #[serde(rename = "exe")]
    pub executable: String,
    pub path: String,
    pub extra: Labels,

    /// Status reported by the emitter itself ("idle" for a paused container...).
    pub status: String,

    // --- Free form ---
    pub labels: Labels,
    pub tags: Labels,
}

impl Envelope {
    /// Lower-cased cloud provider, empty when absent.
    pub fn provider(&self) -> String {
        self.cloud_provider.trim().to_ascii_lowercase()
    }

    pub fn has_container(&self) -> bool {
        !self.container_id.is_empty()
    }

    /// First non-empty value among container name, pod name and hostname.
    pub fn instance_name(&self) -> &str {
        [&self.container_name, &self.pod_name, &self.hostname]
            .into_iter()
            .find(|v| !v.is_empty())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Service name, preferring the OpenTelemetry `service.name` field.
    pub fn service_label(&self) -> &str {
        first_non_empty(&[&self.service_name, &self.service, &self.application, &self.app_name])
    }
}

pub(crate) fn first_non_empty<'a>(values: &[&'a String]) -> &'a str {
    values
        .iter()
        .find(|v| !v.is_empty())
        .map(|v| v.as_str())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_deserialize_empty() {
        let env: Envelope = serde_json::from_str(r#"{"hostname":"web1","exe":"/usr/bin/nginx"}"#).unwrap();
        assert_eq!(env.hostname, "web1");
        assert_eq!(env.executable, "/usr/bin/nginx");
        assert!(env.container_id.is_empty());
        assert!(env.labels.is_empty());
    }

    #[test]
    fn instance_name_priority() {
        let mut env = Envelope { hostname: "node1".into(), ..Default::default() };
        assert_eq!(env.instance_name(), "node1");
        env.pod_name = "api-7f9".into();
        assert_eq!(env.instance_name(), "api-7f9");
        env.container_name = "api".into();
        assert_eq!(env.instance_name(), "api");
    }

    #[test]
    fn provider_is_normalized() {
        let env = Envelope { cloud_provider: " AWS ".into(), ..Default::default() };
        assert_eq!(env.provider(), "aws");
    }
}
