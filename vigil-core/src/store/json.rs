use super::ResourceStore;
use crate::error::StoreError;
use crate::resource::Resource;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Records kept as one pretty-printed JSON array, cached in memory.
///
/// Every commit rewrites the whole file, so the registry flushes through
/// [`ResourceStore::upsert_many`] to commit once per batch. Fine for the few
/// thousand records an installation tracks; anything bigger wants a real
/// database behind the trait.
pub struct JsonFileStore {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, Resource>>,
}

impl JsonFileStore {
    /// Opens `path`, creating an empty array file if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { path: path.into(), cache: Mutex::new(BTreeMap::new()) };
        store.load_from_disk()?;
        info!(path = %store.path.display(), records = store.cache.lock().len(), "json store opened");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(&self) -> Result<(), StoreError> {
        if !self.path.exists() {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            fs::write(&self.path, "[]")?;
        }

        let content = fs::read_to_string(&self.path)?;
        let records: Vec<Resource> = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&content)?
        };

        *self.cache.lock() = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Ok(())
    }

    /// Writes to a sibling temp file then renames, so a crash mid-write
    /// leaves the previous file intact.
    fn save_to_disk(&self, cache: &BTreeMap<String, Resource>) -> Result<(), StoreError> {
        let records: Vec<&Resource> = cache.values().collect();
        let json = serde_json::to_string_pretty(&records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ResourceStore for JsonFileStore {
    fn upsert(&self, resource: &Resource) -> Result<(), StoreError> {
        self.upsert_many(std::slice::from_ref(resource))
    }

    fn upsert_many(&self, resources: &[Resource]) -> Result<(), StoreError> {
        if resources.is_empty() {
            return Ok(());
        }
        let mut cache = self.cache.lock();
        for resource in resources {
            let mut stored = resource.clone();
            stored.updated = false;
            cache.insert(stored.id.clone(), stored);
        }
        self.save_to_disk(&cache)
    }

    fn get(&self, id: &str) -> Result<Option<Resource>, StoreError> {
        Ok(self.cache.lock().get(id).cloned())
    }

    fn load_all(&self) -> Result<Vec<Resource>, StoreError> {
        Ok(self.cache.lock().values().cloned().collect())
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
