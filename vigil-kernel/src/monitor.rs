/**
 * MONITORING - Tâches de fond du kernel
 *
 * RÔLE : Sweep périodique de staleness (online/idle → offline) et flush
 * périodique des ressources modifiées vers le store.
 *
 * FONCTIONNEMENT :
 * - Sweeper : tick toutes les `sweep_interval_secs`, seuil `stale_after_secs`
 * - Flusher : tick toutes les `flush_interval_secs`, I/O du store hors runtime
 *   async (spawn_blocking) et hors de tout verrou du registre
 * - Un échec de flush est loggé et retenté au tick suivant (le flag `updated`
 *   n'est effacé que pour les écritures réussies)
 */

use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Démarre le sweep de staleness
pub fn spawn_stale_sweeper(state: AppState, every: Duration) -> JoinHandle<()> {
    let threshold = state.registry.config().stale_after();
    info!("[monitor] starting stale sweeper (every {:?}, threshold {})", every, threshold);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Le premier tick est immédiat : rien n'est encore stale au démarrage
        interval.tick().await;

        loop {
            interval.tick().await;
            sweep_once(&state);
        }
    })
}

/// Un passage de sweep ; retourne le nombre de ressources passées offline
pub fn sweep_once(state: &AppState) -> usize {
    let marked = state.registry.sweep();
    let mut activity = state.activity.lock();
    activity.sweeps += 1;
    activity.marked_offline += marked as u64;
    activity.last_sweep = Some(OffsetDateTime::now_utc());
    marked
}

/// Démarre le flush périodique vers le store
pub fn spawn_flusher(state: AppState, every: Duration) -> JoinHandle<()> {
    info!("[monitor] starting {} store flusher (every {:?})", state.store.name(), every);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            flush_once(&state).await;
        }
    })
}

/// Écrit les ressources en attente ; retourne le nombre d'écritures réussies
pub async fn flush_once(state: &AppState) -> usize {
    let registry = Arc::clone(&state.registry);
    let store = Arc::clone(&state.store);
    let result = tokio::task::spawn_blocking(move || registry.flush_to(store.as_ref())).await;

    let mut activity = state.activity.lock();
    activity.flushes += 1;
    activity.last_flush = Some(OffsetDateTime::now_utc());
    match result {
        Ok(Ok(written)) => {
            activity.records_written += written as u64;
            if written > 0 {
                debug!("[monitor] flushed {written} resources");
            }
            written
        }
        Ok(Err(e)) => {
            activity.flush_errors += 1;
            error!("[monitor] failed to flush resources: {e}");
            0
        }
        Err(e) => {
            activity.flush_errors += 1;
            error!("[monitor] flush task panicked: {e}");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::clock::ManualClock;
    use vigil_core::{MemoryStore, Registry, ResourceStatus};
    use vigil_devkit::fixtures;

    fn state_with_clock() -> (AppState, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
        let registry = Arc::new(Registry::default().with_clock(clock.clone()));
        let store = Arc::new(MemoryStore::new());
        (AppState::new(registry, store.clone(), None), clock, store)
    }

    #[tokio::test]
    async fn flush_writes_pending_once() {
        let (state, _, store) = state_with_clock();
        state.ingestor.observe(&fixtures::bare_metal());

        assert_eq!(flush_once(&state).await, 2);
        assert_eq!(store.len(), 2);
        assert_eq!(flush_once(&state).await, 0);

        let activity = state.activity.lock().clone();
        assert_eq!(activity.flushes, 2);
        assert_eq!(activity.records_written, 2);
        assert!(activity.last_flush.is_some());
    }

    #[tokio::test]
    async fn sweep_counts_offline_transitions() {
        let (state, clock, _) = state_with_clock();
        let host = state.ingestor.observe(&fixtures::bare_metal()).resource;
        clock.advance(time::Duration::minutes(10));

        assert_eq!(sweep_once(&state), 2);
        assert_eq!(state.registry.get(&host.id).unwrap().status, ResourceStatus::Offline);
        assert_eq!(state.activity.lock().marked_offline, 2);
    }
}
