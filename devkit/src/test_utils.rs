/*!
Test Harness pour le core Vigil

Facilite l'écriture de tests avec:
- Registre câblé sur une horloge manuelle (pas de sleep dans les tests)
- Sink qui enregistre tous les événements émis
- Assertions sur les ressources et les événements
*/

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use vigil_core::clock::ManualClock;
use vigil_core::events::RecordingSink;
use vigil_core::{
    Envelope, Ingestor, Observed, Registry, RegistryConfig, RegistryEvent, RegistryStats, Resource,
    ResourceStatus, SharedRegistry,
};

/// Instant de départ de toutes les horloges de test
pub const T0: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

/// Harness de test complet pour le registre
pub struct TestHarness {
    pub registry: SharedRegistry,
    pub ingestor: Ingestor,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
}

impl TestHarness {
    /// Crée un harness avec la configuration par défaut
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        init_tracing();

        let clock = Arc::new(ManualClock::new(T0));
        let sink = Arc::new(RecordingSink::new());
        let registry: SharedRegistry = Arc::new(
            Registry::new(config)
                .with_clock(clock.clone())
                .with_sink(sink.clone()),
        );

        Self {
            ingestor: Ingestor::new(Arc::clone(&registry)),
            registry,
            clock,
            sink,
        }
    }

    /// Injecte une enveloppe métrique/trace
    pub fn observe(&self, env: &Envelope) -> Observed {
        self.ingestor.observe(env)
    }

    /// Injecte une enveloppe de log
    pub fn observe_log(&self, env: &Envelope) -> Observed {
        self.ingestor.observe_log(env)
    }

    /// Avance l'horloge du registre
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn now(&self) -> OffsetDateTime {
        self.registry.now()
    }

    pub fn resource(&self, id: &str) -> Result<Resource> {
        self.registry.get(id).with_context(|| format!("resource {id} missing"))
    }

    pub fn events(&self) -> Vec<RegistryEvent> {
        self.sink.events()
    }

    /// Nombre d'événements vérifiant le prédicat
    pub fn count_events(&self, pred: impl Fn(&RegistryEvent) -> bool) -> usize {
        self.sink.count(pred)
    }

    /// Assert qu'une ressource a le statut attendu
    pub fn assert_status(&self, id: &str, expected: ResourceStatus) -> Result<()> {
        let actual = self.resource(id)?.status;
        if actual != expected {
            bail!("Status mismatch for {id}: expected {expected}, got {actual}");
        }
        Ok(())
    }

    /// Assert qu'une ressource est rattachée au parent attendu
    pub fn assert_parent(&self, id: &str, parent_id: &str) -> Result<()> {
        let resource = self.resource(id)?;
        if resource.parent_id != parent_id {
            bail!("Parent mismatch for {id}: expected '{parent_id}', got '{}'", resource.parent_id);
        }
        if !parent_id.is_empty() && !self.registry.children(parent_id).iter().any(|c| c.id == id) {
            bail!("{id} missing from children index of {parent_id}");
        }
        Ok(())
    }

    /// Assert qu'un label a une valeur spécifique
    pub fn assert_label(&self, id: &str, key: &str, expected: &str) -> Result<()> {
        let resource = self.resource(id)?;
        match resource.labels.get(key) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => bail!("Label '{key}' mismatch on {id}: expected '{expected}', got '{actual}'"),
            None => bail!("Label '{key}' not found on {id}"),
        }
    }

    /// Assert sur le nombre d'événements d'un type donné
    pub fn assert_event_count(&self, expected: usize, pred: impl Fn(&RegistryEvent) -> bool) -> Result<()> {
        let actual = self.sink.count(pred);
        if actual != expected {
            bail!("Expected {expected} matching events, got {actual}: {:?}", self.sink.events());
        }
        Ok(())
    }

    pub fn get_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Reset des événements collectés (le registre est conservé)
    pub fn reset_events(&self) {
        self.sink.clear();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs des tests visibles avec `RUST_LOG=debug cargo test -- --nocapture`
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn harness_tracks_lifecycle() {
        let harness = TestHarness::new();
        let host = harness.observe(&fixtures::bare_metal()).resource;

        harness.assert_status(&host.id, ResourceStatus::Online).unwrap();
        harness.assert_label(&host.id, "hostname", "web1").unwrap();

        harness.advance(Duration::minutes(10));
        assert_eq!(harness.registry.sweep(), 2);
        harness.assert_status(&host.id, ResourceStatus::Offline).unwrap();
    }

    #[test]
    fn assertions_report_mismatch() {
        let harness = TestHarness::new();
        let host = harness.observe(&fixtures::bare_metal()).resource;
        assert!(harness.assert_status(&host.id, ResourceStatus::Idle).is_err());
        assert!(harness.assert_label(&host.id, "team", "x").is_err());
        assert!(harness.resource("nope").is_err());
    }
}
