/**
 * VIGIL KERNEL - Assemblage du serveur autour du core
 *
 * RÔLE : Config YAML, état partagé, tâches de fond et API REST.
 * Le binaire (main.rs) ne fait que le bootstrap ; tout le reste est ici pour
 * être testable sans ouvrir de socket.
 */

pub mod config;
pub mod http;
pub mod monitor;
pub mod state;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use vigil_core::{JsonFileStore, MemoryStore, ResourceStore};

/// Store configuré : fichier JSON si un chemin est donné, mémoire sinon
pub fn open_store(cfg: &config::StoreConf) -> Result<Arc<dyn ResourceStore>> {
    match &cfg.path {
        Some(path) => {
            let store = JsonFileStore::open(path)
                .with_context(|| format!("failed to open resource store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        None => {
            info!("[kernel] no store path configured, resources kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
