/*!
# Vigil DevKit - Fixtures et utilitaires de test

Bibliothèque facilitant l'écriture de tests autour du core Vigil avec:
- Builder d'enveloppes et enveloppes types (bare-metal, AWS, Podman, K8s...)
- Harness combinant registre, horloge manuelle et sink d'événements
- Assertions sur les ressources et les événements émis
*/

pub mod fixtures;
pub mod test_utils;

pub use fixtures::EnvelopeBuilder;
pub use test_utils::TestHarness;
