//! Vigil core - identity and reconciliation for observability data
//!
//! Every metric, log and trace batch arrives wrapped in an [`Envelope`]. The
//! core turns those envelopes into a canonical inventory of entities:
//! - [`identity`] derives a stable ID from whatever fields are present
//! - [`namespace`] classifies the monitoring namespace ("AWS/EC2", "Podman"...)
//! - [`labels`] merges system labels with free-form ones without letting the
//!   latter impersonate the former
//! - [`registry`] keeps the live, concurrently updated set of resources with
//!   staleness sweeps, filtering and search
//! - [`ingest`] wires the four together for one envelope

pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod identity;
pub mod ingest;
pub mod labels;
pub mod namespace;
pub mod registry;
pub mod resource;
pub mod store;

pub use config::RegistryConfig;
pub use envelope::{Envelope, Labels};
pub use error::{ConfigError, RegistryError, StoreError};
pub use events::{EventSink, RegistryEvent};
pub use identity::{resolve, Identity};
pub use ingest::{Ingestor, Observed};
pub use namespace::classify;
pub use registry::{Registry, RegistryStats, ResourceFilter, ResourceSearchQuery, SharedRegistry};
pub use resource::{Resource, ResourceKind, ResourceStatus, ResourceUpdate};
pub use store::{JsonFileStore, MemoryStore, ResourceStore};
