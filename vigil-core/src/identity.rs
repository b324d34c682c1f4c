//! Identity resolution: envelope → stable resource ID.
//!
//! Rules are evaluated top to bottom and the first match wins:
//! 1. cloud provider with both identifying fields (`aws-<account>-<instance>`...)
//! 2. container ID (≥ 12 chars) + hostname (`container-<hostname>-<short id>`)
//! 3. hostname + IP address (`host-<hostname>-<ip with dashes>`)
//! 4. the `unknown` sentinel
//!
//! The output only depends on envelope fields, never on process state, so the
//! registry can use it as a primary key across restarts.

use crate::envelope::Envelope;
use crate::resource::ResourceKind;
use std::fmt;

/// Sentinel returned when no rule applies.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Short container IDs follow the docker/podman 12 char convention.
pub const SHORT_CONTAINER_ID_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudProvider {
    Aws,
    Gcp,
    Azure,
}

impl CloudProvider {
    /// Case-insensitive match on the provider name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "aws" => Some(Self::Aws),
            "gcp" => Some(Self::Gcp),
            "azure" => Some(Self::Azure),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
        }
    }

    /// Provider-specific (scope, instance) pair, if both are present.
    fn identifying_fields<'a>(&self, env: &'a Envelope) -> Option<(&'a str, &'a str)> {
        let scope = match self {
            Self::Aws => &env.account_id,
            Self::Gcp => &env.project_id,
            Self::Azure => &env.resource_group,
        };
        if scope.is_empty() || env.instance_id.is_empty() {
            return None;
        }
        Some((scope.as_str(), env.instance_id.as_str()))
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which resolution rule named the entity, with the fields it used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Cloud {
        provider: CloudProvider,
        scope: String,
        instance: String,
    },
    Container {
        hostname: String,
        short_id: String,
    },
    BareMetal {
        hostname: String,
        ip: String,
    },
    Unknown,
}

impl Identity {
    pub fn of(env: &Envelope) -> Self {
        cloud_identity(env)
            .or_else(|| container_identity(env))
            .or_else(|| bare_metal_identity(env))
            .unwrap_or(Identity::Unknown)
    }

    /// Identity of the machine an envelope was emitted from, ignoring the
    /// container rule. Used to name a container's parent host.
    pub fn host_of(env: &Envelope) -> Self {
        cloud_identity(env)
            .or_else(|| bare_metal_identity(env))
            .unwrap_or(Identity::Unknown)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Identity::Unknown)
    }

    /// Resource kind implied by the rule that matched.
    pub fn kind(&self) -> Option<ResourceKind> {
        match self {
            Identity::Cloud { .. } | Identity::BareMetal { .. } => Some(ResourceKind::Host),
            Identity::Container { .. } => Some(ResourceKind::Container),
            Identity::Unknown => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Cloud { provider, scope, instance } => write!(f, "{provider}-{scope}-{instance}"),
            Identity::Container { hostname, short_id } => write!(f, "container-{hostname}-{short_id}"),
            Identity::BareMetal { hostname, ip } => write!(f, "host-{hostname}-{}", ip.replace('.', "-")),
            Identity::Unknown => f.write_str(UNKNOWN_IDENTITY),
        }
    }
}

/// Stable identity string for an envelope. Never empty.
pub fn resolve(env: &Envelope) -> String {
    Identity::of(env).to_string()
}

fn cloud_identity(env: &Envelope) -> Option<Identity> {
    let provider = CloudProvider::parse(&env.cloud_provider)?;
    let (scope, instance) = provider.identifying_fields(env)?;
    Some(Identity::Cloud {
        provider,
        scope: scope.to_string(),
        instance: instance.to_string(),
    })
}

fn container_identity(env: &Envelope) -> Option<Identity> {
    if env.hostname.is_empty() {
        return None;
    }
    let short_id = short_container_id(&env.container_id)?;
    Some(Identity::Container {
        hostname: env.hostname.clone(),
        short_id,
    })
}

fn bare_metal_identity(env: &Envelope) -> Option<Identity> {
    if env.hostname.is_empty() || env.ip_address.is_empty() {
        return None;
    }
    Some(Identity::BareMetal {
        hostname: env.hostname.clone(),
        ip: env.ip_address.clone(),
    })
}

/// First 12 characters of a container ID, `None` when the ID is shorter.
pub fn short_container_id(container_id: &str) -> Option<String> {
    let short: String = container_id.chars().take(SHORT_CONTAINER_ID_LEN).collect();
    if short.chars().count() < SHORT_CONTAINER_ID_LEN {
        return None;
    }
    Some(short)
}
