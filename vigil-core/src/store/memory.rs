use super::ResourceStore;
use crate::error::StoreError;
use crate::resource::Resource;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Volatile store; records are lost with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, Resource>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl ResourceStore for MemoryStore {
    fn upsert(&self, resource: &Resource) -> Result<(), StoreError> {
        let mut stored = resource.clone();
        stored.updated = false;
        self.records.write().insert(stored.id.clone(), stored);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Resource>, StoreError> {
        Ok(self.records.read().get(id).cloned())
    }

    fn load_all(&self) -> Result<Vec<Resource>, StoreError> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ResourceFilter;
    use crate::resource::ResourceKind;
    use time::macros::datetime;

    #[test]
    fn upsert_replaces_by_id() {
        let store = MemoryStore::new();
        let now = datetime!(2025-06-01 12:00 UTC);
        let mut r = Resource::new("h1", ResourceKind::Host, now);
        store.upsert(&r).unwrap();
        r.name = "web1".into();
        r.updated = true;
        store.upsert(&r).unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.get("h1").unwrap().unwrap();
        assert_eq!(stored.name, "web1");
        assert!(!stored.updated);
        assert!(store.get("h2").unwrap().is_none());
    }

    #[test]
    fn query_applies_filter() {
        let store = MemoryStore::new();
        let now = datetime!(2025-06-01 12:00 UTC);
        store.upsert(&Resource::new("h1", ResourceKind::Host, now)).unwrap();
        store.upsert(&Resource::new("c1", ResourceKind::Container, now)).unwrap();

        let hosts = store.query(&ResourceFilter::default().kind(ResourceKind::Host)).unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].id, "h1");
    }
}
