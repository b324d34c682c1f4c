//! Persistence adapters for registry records.
//!
//! The registry never blocks on I/O: it hands records flagged `updated` to a
//! [`ResourceStore`] through [`Registry::flush_to`](crate::registry::Registry::flush_to)
//! and restores from [`ResourceStore::load_all`] at startup.

mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::registry::ResourceFilter;
use crate::resource::Resource;

/// Common interface of every record store.
pub trait ResourceStore: Send + Sync {
    /// Inserts or replaces the record with the same ID.
    fn upsert(&self, resource: &Resource) -> Result<(), StoreError>;

    /// Batch form of [`upsert`](Self::upsert). Stores with a costly commit
    /// override it to commit once per batch.
    fn upsert_many(&self, resources: &[Resource]) -> Result<(), StoreError> {
        resources.iter().try_for_each(|r| self.upsert(r))
    }

    fn get(&self, id: &str) -> Result<Option<Resource>, StoreError>;

    /// Stored records matching `filter`, in ID order.
    fn query(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, StoreError> {
        let mut out: Vec<Resource> = self.load_all()?.into_iter().filter(|r| filter.matches(r)).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn load_all(&self) -> Result<Vec<Resource>, StoreError>;

    /// Short name for logs ("memory", "json").
    fn name(&self) -> &'static str;
}
