//! Resource registry: the canonical, concurrently mutated set of entities.
//!
//! Records live in a `DashMap` of per-record mutexes. The map's shard lock is
//! only held long enough to fetch or insert a slot; merge work happens under
//! the record's own lock, so observations for unrelated entities never wait
//! on each other. No operation ever holds two record locks at once.

mod filter;
mod search;

pub use filter::ResourceFilter;
pub use search::{ResourceSearchQuery, SearchParams};

use crate::clock::{Clock, SystemClock};
use crate::config::RegistryConfig;
use crate::envelope::Labels;
use crate::error::{RegistryError, StoreError};
use crate::events::{EventSink, RegistryEvent, TracingSink};
use crate::identity::UNKNOWN_IDENTITY;
use crate::labels::{merge_labels, merge_tags};
use crate::resource::{Resource, ResourceKind, ResourceStatus, ResourceUpdate};
use crate::store::ResourceStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

type Slot = Arc<Mutex<Resource>>;

pub struct Registry {
    records: DashMap<String, Slot>,
    /// parent ID → child IDs. Owned here, never by the resources themselves.
    children: DashMap<String, BTreeSet<String>>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    config: RegistryConfig,
}

pub type SharedRegistry = Arc<Registry>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub pending_writes: usize,
    pub orphans: usize,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            records: DashMap::new(),
            children: DashMap::new(),
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub(crate) fn emit(&self, event: RegistryEvent) {
        self.sink.emit(event);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records a fresh observation: bumps `last_seen` and sets the status to
    /// the reported hint, or `online` when none was given.
    pub fn upsert(&self, id: &str, kind: ResourceKind, update: ResourceUpdate, labels: Labels) -> Resource {
        self.write(id, kind, update, labels, true)
    }

    /// Records an entity discovered indirectly (no heartbeat from it). A new
    /// record stays `unknown`; an existing one keeps its status and `last_seen`.
    pub fn register(&self, id: &str, kind: ResourceKind, update: ResourceUpdate, labels: Labels) -> Resource {
        self.write(id, kind, update, labels, false)
    }

    pub fn get(&self, id: &str) -> Result<Resource, RegistryError> {
        self.slot(id)
            .map(|slot| slot.lock().clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Consistent copy of every record, one record lock at a time.
    pub fn snapshot(&self) -> Vec<Resource> {
        self.slots().into_iter().map(|(_, slot)| slot.lock().clone()).collect()
    }

    /// Marks online/idle records not seen within `threshold` as offline.
    /// Returns how many records changed.
    pub fn sweep_stale(&self, threshold: Duration) -> usize {
        let now = self.clock.now();
        let slots = self.slots();
        // A threshold reaching past the representable range: nothing is that old.
        let Some(cutoff) = now.checked_sub(threshold) else {
            self.emit(RegistryEvent::SweepCompleted { scanned: slots.len(), marked_offline: 0 });
            return 0;
        };
        let scanned = slots.len();
        let mut marked = 0;

        for (id, slot) in slots {
            let from = {
                let mut record = slot.lock();
                if !record.status.can_go_stale() || record.last_seen >= cutoff {
                    continue;
                }
                let from = record.status;
                record.status = ResourceStatus::Offline;
                record.mark_changed(now);
                from
            };
            marked += 1;
            self.emit(RegistryEvent::StatusChanged { id, from, to: ResourceStatus::Offline });
        }

        self.emit(RegistryEvent::SweepCompleted { scanned, marked_offline: marked });
        marked
    }

    /// Sweep with the configured threshold.
    pub fn sweep(&self) -> usize {
        self.sweep_stale(self.config.stale_after())
    }

    /// Merges user tags into the record; incoming values overwrite.
    pub fn set_tags(&self, id: &str, tags: &Labels) -> Result<Resource, RegistryError> {
        self.edit_tags(id, |current| merge_tags(current, tags))
    }

    pub fn replace_tags(&self, id: &str, tags: Labels) -> Result<Resource, RegistryError> {
        self.edit_tags(id, move |_| tags)
    }

    pub fn remove_tag(&self, id: &str, key: &str) -> Result<Resource, RegistryError> {
        self.edit_tags(id, |current| {
            let mut next = current.clone();
            next.remove(key);
            next
        })
    }

    /// Direct children of `id`, ordered by ID.
    pub fn children(&self, id: &str) -> Vec<Resource> {
        let ids: Vec<String> = self
            .children
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.iter().filter_map(|child| self.get(child).ok()).collect()
    }

    /// Records whose parent ID has no matching record.
    pub fn orphans(&self) -> Vec<Resource> {
        let mut orphans: Vec<Resource> = self
            .snapshot()
            .into_iter()
            .filter(|r| !r.parent_id.is_empty() && !self.contains(&r.parent_id))
            .collect();
        orphans.sort_by(|a, b| a.id.cmp(&b.id));
        orphans
    }

    /// `Ok` when the record is a root or its parent exists.
    pub fn check_parent(&self, id: &str) -> Result<(), RegistryError> {
        let record = self.get(id)?;
        if record.parent_id.is_empty() || self.contains(&record.parent_id) {
            return Ok(());
        }
        Err(RegistryError::OrphanParent { id: record.id, parent_id: record.parent_id })
    }

    /// Records with a persistence write owed.
    pub fn pending_writes(&self) -> Vec<Resource> {
        self.slots()
            .into_iter()
            .filter_map(|(_, slot)| {
                let record = slot.lock();
                record.updated.then(|| record.clone())
            })
            .collect()
    }

    /// Clears the `updated` flag unless the record changed after the written copy.
    pub fn mark_persisted(&self, id: &str, revision: u64) -> bool {
        let Some(slot) = self.slot(id) else { return false };
        let mut record = slot.lock();
        if record.revision != revision {
            return false;
        }
        record.updated = false;
        true
    }

    /// Writes pending records to `store` as one batch. Store I/O happens
    /// outside every record lock.
    pub fn flush_to(&self, store: &dyn ResourceStore) -> Result<usize, StoreError> {
        let pending = self.pending_writes();
        if pending.is_empty() {
            return Ok(0);
        }
        store.upsert_many(&pending)?;
        Ok(pending
            .iter()
            .filter(|record| self.mark_persisted(&record.id, record.revision))
            .count())
    }

    /// Loads previously persisted records. Existing IDs are left untouched.
    pub fn restore(&self, records: impl IntoIterator<Item = Resource>) -> usize {
        let mut restored = 0;
        for mut record in records {
            record.updated = false;
            let id = record.id.clone();
            let parent = record.parent_id.clone();
            if let Entry::Vacant(vacant) = self.records.entry(id.clone()) {
                vacant.insert(Arc::new(Mutex::new(record)));
                if !parent.is_empty() {
                    self.children.entry(parent).or_default().insert(id);
                }
                restored += 1;
            }
        }
        restored
    }

    /// Explicit removal; nothing in the registry purges on its own.
    pub fn purge(&self, id: &str) -> Result<Resource, RegistryError> {
        let (_, slot) = self
            .records
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let record = slot.lock().clone();
        if !record.parent_id.is_empty() {
            if let Some(mut siblings) = self.children.get_mut(&record.parent_id) {
                siblings.remove(id);
            }
        }
        self.emit(RegistryEvent::Purged { id: id.to_string() });
        Ok(record)
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for record in self.snapshot() {
            stats.total += 1;
            *stats.by_kind.entry(record.kind.to_string()).or_default() += 1;
            *stats.by_status.entry(record.status.to_string()).or_default() += 1;
            if record.updated {
                stats.pending_writes += 1;
            }
            if !record.parent_id.is_empty() && !self.contains(&record.parent_id) {
                stats.orphans += 1;
            }
        }
        stats
    }

    fn slot(&self, id: &str) -> Option<Slot> {
        self.records.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Slot handles cloned out of the map so no shard lock outlives this call.
    fn slots(&self) -> Vec<(String, Slot)> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    fn is_attached(&self, id: &str, slot: &Slot) -> bool {
        self.records.get(id).is_some_and(|entry| Arc::ptr_eq(entry.value(), slot))
    }

    fn slot_or_create(&self, id: &str, kind: ResourceKind, now: OffsetDateTime) -> (Slot, bool) {
        match self.records.entry(id.to_string()) {
            Entry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
            Entry::Vacant(vacant) => {
                let slot = Arc::new(Mutex::new(Resource::new(id, kind, now)));
                vacant.insert(Arc::clone(&slot));
                (slot, true)
            }
        }
    }

    fn write(&self, id: &str, kind: ResourceKind, update: ResourceUpdate, labels: Labels, heartbeat: bool) -> Resource {
        let id = if id.trim().is_empty() { UNKNOWN_IDENTITY } else { id };
        let now = self.clock.now();
        // Parent lookup locks the parent record, so it runs before ours is taken.
        let parent = self.checked_parent(id, kind, &update.parent_id);

        let (snapshot, from, created) = loop {
            let (slot, created) = self.slot_or_create(id, kind, now);
            let mut record = slot.lock();
            // Purged between lookup and lock: the slot is detached, take a fresh one.
            if !self.is_attached(id, &slot) {
                continue;
            }
            let from = record.status;

            record.apply(&update);
            record.labels = merge_labels(&record.labels, &labels);
            if let Some(parent_id) = parent.clone() {
                self.link_parent(&mut record, parent_id);
            }

            record.status = match (heartbeat, update.status) {
                (_, Some(hint)) => hint,
                (true, None) => ResourceStatus::Online,
                (false, None) => record.status,
            };
            if heartbeat {
                record.touch(now);
            } else {
                record.mark_changed(now);
            }
            break (record.clone(), from, created);
        };

        if created {
            self.emit(RegistryEvent::ResourceCreated { id: snapshot.id.clone(), kind: snapshot.kind });
        } else {
            self.emit(RegistryEvent::ResourceUpdated { id: snapshot.id.clone() });
        }
        if from != snapshot.status {
            self.emit(RegistryEvent::StatusChanged { id: snapshot.id.clone(), from, to: snapshot.status });
        }
        snapshot
    }

    /// Parent ID to link, after the hierarchy rules. Missing parents are
    /// accepted and reported as orphans.
    fn checked_parent(&self, id: &str, kind: ResourceKind, parent_id: &str) -> Option<String> {
        if parent_id.is_empty() || parent_id == id || kind.is_root() {
            return None;
        }
        match self.slot(parent_id) {
            Some(parent) => {
                let parent_kind = parent.lock().kind;
                if !parent_kind.accepts_child(kind) {
                    self.emit(RegistryEvent::ParentRejected {
                        id: id.to_string(),
                        kind,
                        parent_id: parent_id.to_string(),
                        parent_kind,
                    });
                    return None;
                }
            }
            None => self.emit(RegistryEvent::OrphanParent {
                id: id.to_string(),
                parent_id: parent_id.to_string(),
            }),
        }
        Some(parent_id.to_string())
    }

    /// Runs under the child's record lock so concurrent re-parenting of the
    /// same record keeps the index in step.
    fn link_parent(&self, record: &mut Resource, parent_id: String) {
        if record.parent_id == parent_id {
            self.children.entry(parent_id).or_default().insert(record.id.clone());
            return;
        }
        if !record.parent_id.is_empty() {
            if let Some(mut previous) = self.children.get_mut(&record.parent_id) {
                previous.remove(&record.id);
            }
        }
        self.children.entry(parent_id.clone()).or_default().insert(record.id.clone());
        record.parent_id = parent_id;
    }

    fn edit_tags(&self, id: &str, edit: impl FnOnce(&Labels) -> Labels) -> Result<Resource, RegistryError> {
        let slot = self.slot(id).ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let now = self.clock.now();
        let snapshot = {
            let mut record = slot.lock();
            record.tags = edit(&record.tags);
            record.mark_changed(now);
            record.clone()
        };
        self.emit(RegistryEvent::TagsChanged { id: id.to_string() });
        Ok(snapshot)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
