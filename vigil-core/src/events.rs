//! Structured registry events and the sink they are emitted to.
//!
//! The registry never reaches for a process-wide logger: it is handed an
//! [`EventSink`]. [`TracingSink`] forwards to `tracing`, [`RecordingSink`]
//! keeps events in memory for assertions.

use crate::resource::{ResourceKind, ResourceStatus};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    ResourceCreated {
        id: String,
        kind: ResourceKind,
    },
    ResourceUpdated {
        id: String,
    },
    StatusChanged {
        id: String,
        from: ResourceStatus,
        to: ResourceStatus,
    },
    /// Not enough fields to name the entity; recorded under the sentinel ID.
    IdentityIndeterminate {
        hostname: String,
        agent_id: String,
    },
    OrphanParent {
        id: String,
        parent_id: String,
    },
    /// Parent link dropped because the kinds do not nest.
    ParentRejected {
        id: String,
        kind: ResourceKind,
        parent_id: String,
        parent_kind: ResourceKind,
    },
    TagsChanged {
        id: String,
    },
    SweepCompleted {
        scanned: usize,
        marked_offline: usize,
    },
    Purged {
        id: String,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: RegistryEvent);
}

/// Default sink: one `tracing` record per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: RegistryEvent) {
        match event {
            RegistryEvent::ResourceCreated { id, kind } => {
                info!(resource_id = %id, %kind, "registered resource")
            }
            RegistryEvent::ResourceUpdated { id } => debug!(resource_id = %id, "updated resource"),
            RegistryEvent::StatusChanged { id, from, to } => {
                info!(resource_id = %id, %from, %to, "status changed")
            }
            RegistryEvent::IdentityIndeterminate { hostname, agent_id } => {
                warn!(%hostname, %agent_id, "identity indeterminate, using sentinel")
            }
            RegistryEvent::OrphanParent { id, parent_id } => {
                debug!(resource_id = %id, %parent_id, "parent not registered yet")
            }
            RegistryEvent::ParentRejected { id, kind, parent_id, parent_kind } => warn!(
                resource_id = %id,
                %kind,
                %parent_id,
                %parent_kind,
                "parent kind does not accept child, link dropped"
            ),
            RegistryEvent::TagsChanged { id } => info!(resource_id = %id, "tags changed"),
            RegistryEvent::SweepCompleted { scanned, marked_offline } => {
                if marked_offline > 0 {
                    info!(scanned, marked_offline, "stale sweep completed");
                } else {
                    debug!(scanned, "stale sweep completed");
                }
            }
            RegistryEvent::Purged { id } => info!(resource_id = %id, "purged resource"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: RegistryEvent) {}
}

/// Keeps every event; test helper.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RegistryEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RegistryEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&RegistryEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: RegistryEvent) {
        self.events.lock().push(event);
    }
}
