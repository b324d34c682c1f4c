/**
 * ÉTAT PARTAGÉ - Tout ce que les handlers HTTP et les tâches de fond se partagent
 *
 * RÔLE : Registre de ressources, pipeline d'ingestion, store de persistance
 * et compteurs d'activité du kernel.
 *
 * FONCTIONNEMENT : Le registre gère sa propre concurrence (verrou par
 * ressource). Seuls les compteurs du kernel passent par un `Shared<T>`.
 */

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use vigil_core::{Ingestor, ResourceStore, SharedRegistry};

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Activité du kernel exposée sur /stats
#[derive(Debug, Clone, Default, Serialize)]
pub struct KernelActivity {
    pub observations: u64,
    pub sweeps: u64,
    pub marked_offline: u64,
    pub flushes: u64,
    pub records_written: u64,
    pub flush_errors: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sweep: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_flush: Option<OffsetDateTime>,
}

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub ingestor: Ingestor,
    pub store: Arc<dyn ResourceStore>,
    pub activity: Shared<KernelActivity>,
    /// Clé attendue dans `x-api-key` ; None = API fermée (sauf /health)
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(registry: SharedRegistry, store: Arc<dyn ResourceStore>, api_key: Option<String>) -> Self {
        Self {
            ingestor: Ingestor::new(Arc::clone(&registry)),
            registry,
            store,
            activity: new_state(KernelActivity::default()),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }
}
