//! Monitoring namespace classification. Descriptive only, never part of the identity.

use crate::envelope::Envelope;
use crate::identity::CloudProvider;

pub const AWS_EC2: &str = "AWS/EC2";
pub const AWS_ECS: &str = "AWS/ECS";
pub const GCP_COMPUTE: &str = "GCP/Compute";
pub const AZURE_VM: &str = "Azure/VM";
pub const K8S_POD: &str = "K8s/Pod";
pub const PODMAN: &str = "Podman";
pub const SYSTEM: &str = "System";

pub fn classify(env: &Envelope) -> String {
    classify_str(env).to_string()
}

fn classify_str(env: &Envelope) -> &'static str {
    if let Some(provider) = CloudProvider::parse(&env.cloud_provider) {
        return match provider {
            CloudProvider::Aws if env.service_id.eq_ignore_ascii_case("ecs") => AWS_ECS,
            CloudProvider::Aws => AWS_EC2,
            CloudProvider::Gcp => GCP_COMPUTE,
            CloudProvider::Azure => AZURE_VM,
        };
    }

    match (env.has_container(), env.cluster_name.is_empty()) {
        (true, false) => K8S_POD,
        (true, true) => PODMAN,
        _ => SYSTEM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_namespaces() {
        let mut e = Envelope { cloud_provider: "aws".into(), ..Default::default() };
        assert_eq!(classify(&e), AWS_EC2);
        e.service_id = "ecs".into();
        assert_eq!(classify(&e), AWS_ECS);
        e.cloud_provider = "gcp".into();
        assert_eq!(classify(&e), GCP_COMPUTE);
        e.cloud_provider = "AZURE".into();
        assert_eq!(classify(&e), AZURE_VM);
    }

    #[test]
    fn container_namespaces() {
        let mut e = Envelope { container_id: "abc".into(), ..Default::default() };
        assert_eq!(classify(&e), PODMAN);
        e.cluster_name = "prod-eu".into();
        assert_eq!(classify(&e), K8S_POD);
    }

    #[test]
    fn cluster_without_container_is_system() {
        let e = Envelope { cluster_name: "prod-eu".into(), ..Default::default() };
        assert_eq!(classify(&e), SYSTEM);
    }

    #[test]
    fn unknown_provider_is_ignored() {
        let e = Envelope { cloud_provider: "hetzner".into(), ..Default::default() };
        assert_eq!(classify(&e), SYSTEM);
    }
}
