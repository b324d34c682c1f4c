//! Error taxonomy of the core. Nothing here is fatal to the process.

/// Errors surfaced by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Resource not found: {0}")]
    NotFound(String),
    /// Advisory: the parent reference has no matching record (yet).
    #[error("Resource {id} references missing parent {parent_id}")]
    OrphanParent { id: String, parent_id: String },
    /// Rejected at the query boundary, never reaches the registry internals.
    #[error("Invalid filter criteria: {0}")]
    InvalidFilterCriteria(String),
    #[error("Unknown resource kind: {0}")]
    UnknownKind(String),
    #[error("Unknown resource status: {0}")]
    UnknownStatus(String),
}

/// Errors from a persistence adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
