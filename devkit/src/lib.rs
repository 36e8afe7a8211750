/*!
# Symbion DevKit - Stubs et Utilitaires pour le moteur de checks

Bibliothèque facilitant les tests du moteur avec:
- Stubs de plugins de check qui comptent leurs appels
- Submitter collecteur
- Builders de sorties d'agent, de sections et de services
- Harness qui monte un run complet en mémoire
*/

pub mod check_stub;
pub mod fixtures;
pub mod test_utils;

pub use check_stub::{CollectingSubmitter, RecordedCall, StubBehaviour, StubCheckPlugin};
pub use fixtures::{AgentOutputBuilder, HostSectionsBuilder, ServiceBuilder};
pub use test_utils::TestHarness;
