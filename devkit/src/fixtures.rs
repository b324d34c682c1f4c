/*!
Fixtures d'enveloppes pour les tests Vigil

Fournit un builder chaînable et des enveloppes types correspondant aux
environnements réellement rencontrés (agent bare-metal, instance EC2,
conteneur Podman, pod Kubernetes, source syslog).
*/

use serde_json::Value;
use vigil_core::Envelope;

/// Builder chaînable d'enveloppes de test
#[derive(Debug, Clone, Default)]
pub struct EnvelopeBuilder {
    env: Envelope,
}

impl EnvelopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Part d'une enveloppe existante
    pub fn based_on(env: Envelope) -> Self {
        Self { env }
    }

    pub fn agent<S: Into<String>>(mut self, agent_id: S) -> Self {
        self.env.agent_id = agent_id.into();
        self.env.agent_version = "0.4.2".to_string();
        self
    }

    pub fn host<S: Into<String>>(mut self, hostname: S, ip: S) -> Self {
        self.env.hostname = hostname.into();
        self.env.ip_address = ip.into();
        self.env.os = "linux".to_string();
        self.env.architecture = "amd64".to_string();
        self
    }

    pub fn hostname<S: Into<String>>(mut self, hostname: S) -> Self {
        self.env.hostname = hostname.into();
        self
    }

    /// Fournisseur cloud + champs identifiants (compte/projet/groupe, instance)
    pub fn cloud<S: Into<String>>(mut self, provider: S, scope: S, instance_id: S) -> Self {
        let provider = provider.into();
        let scope = scope.into();
        match provider.to_ascii_lowercase().as_str() {
            "gcp" => self.env.project_id = scope,
            "azure" => self.env.resource_group = scope,
            _ => self.env.account_id = scope,
        }
        self.env.cloud_provider = provider;
        self.env.instance_id = instance_id.into();
        self
    }

    pub fn region<S: Into<String>>(mut self, region: S) -> Self {
        self.env.region = region.into();
        self
    }

    pub fn container<S: Into<String>>(mut self, container_id: S, name: S) -> Self {
        self.env.container_id = container_id.into();
        self.env.container_name = name.into();
        self
    }

    pub fn pod<S: Into<String>>(mut self, pod_name: S, cluster: S) -> Self {
        self.env.pod_name = pod_name.into();
        self.env.cluster_name = cluster.into();
        self
    }

    pub fn kind<S: Into<String>>(mut self, kind: S) -> Self {
        self.env.kind = kind.into();
        self
    }

    pub fn service<S: Into<String>>(mut self, service_name: S) -> Self {
        self.env.service_name = service_name.into();
        self
    }

    pub fn environment<S: Into<String>>(mut self, environment: S) -> Self {
        self.env.environment = environment.into();
        self
    }

    pub fn status<S: Into<String>>(mut self, status: S) -> Self {
        self.env.status = status.into();
        self
    }

    /// Label libre (peut tenter d'écraser une clé système, c'est voulu pour les tests)
    pub fn label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.labels.insert(key.into(), value.into());
        self
    }

    /// Champ additionnel spécifique aux logs
    pub fn extra<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.extra.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Envelope {
        self.env
    }

    /// Forme JSON telle que reçue sur `POST /observations`
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.env).unwrap_or(Value::Null)
    }
}

/// Agent installé directement sur une machine physique
pub fn bare_metal() -> Envelope {
    EnvelopeBuilder::new().agent("agent-1").host("web1", "10.0.0.5").build()
}

/// Instance EC2 : ID attendu `aws-123456789012-i-0abc`
pub fn aws_instance() -> Envelope {
    EnvelopeBuilder::based_on(bare_metal())
        .cloud("aws", "123456789012", "i-0abc")
        .region("us-east-1")
        .build()
}

/// Conteneur Podman sur `web1` : ID attendu `container-web1-abcdef012345`
pub fn podman_container() -> Envelope {
    EnvelopeBuilder::based_on(bare_metal())
        .container("abcdef0123456789", "nginx")
        .build()
}

/// Pod Kubernetes sur `node1`
pub fn k8s_pod() -> Envelope {
    EnvelopeBuilder::new()
        .agent("agent-k8s")
        .host("node1", "10.1.0.7")
        .container("0123456789abcdef", "api")
        .pod("api-7d9f", "prod-eu")
        .build()
}

/// Service applicatif tournant dans le conteneur de [`podman_container`]
pub fn app_in_container() -> Envelope {
    EnvelopeBuilder::based_on(podman_container()).kind("app").service("checkout").build()
}

/// Équipement réseau qui n'envoie que du syslog
pub fn syslog_source() -> Envelope {
    EnvelopeBuilder::new().kind("syslog").host("router1", "10.0.0.1").build()
}

/// Enveloppe sans aucun champ identifiant
pub fn anonymous() -> Envelope {
    EnvelopeBuilder::new().hostname("lonely").build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::resolve;

    #[test]
    fn canned_envelopes_resolve_as_documented() {
        assert_eq!(resolve(&bare_metal()), "host-web1-10-0-0-5");
        assert_eq!(resolve(&aws_instance()), "aws-123456789012-i-0abc");
        assert_eq!(resolve(&podman_container()), "container-web1-abcdef012345");
        assert_eq!(resolve(&k8s_pod()), "container-node1-0123456789ab");
        assert_eq!(resolve(&anonymous()), "unknown");
    }

    #[test]
    fn builder_routes_cloud_scope() {
        let env = EnvelopeBuilder::new().cloud("gcp", "proj-1", "vm-7").hostname("g1").build();
        assert_eq!(env.project_id, "proj-1");
        assert_eq!(resolve(&env), "gcp-proj-1-vm-7");
    }

    #[test]
    fn json_form_uses_wire_names() {
        let json = EnvelopeBuilder::based_on(bare_metal()).to_json();
        assert_eq!(json["hostname"], "web1");
        assert_eq!(json["agent_id"], "agent-1");
    }
}
