/*!
# Symbion CheckEngine - Exécution des checks et résolution des sections

Moteur synchrone utilisé par le kernel pour surveiller un hôte (ou un cluster) :
- parse des sorties d'agents en sections, providers par `HostKey`
- résolution des sections demandées par un plugin (supersession, clusters)
- appel contenu des fonctions de check (crashs, résultats ignorés, timeouts)
- résultat global du run ("[agent] Success, Missing monitoring data ...")

Les E/S (récupération des données, soumission, stockage) passent par des traits
(`Fetcher`, `Parser`, `Summarizer`, `Submitter`, `TreeStore`).
*/

pub mod aggregator;
pub mod checking;
pub mod checkresults;
pub mod cluster_mode;
pub mod config;
pub mod context;
pub mod crash_reporting;
pub mod errors;
pub mod fetcher;
pub mod inventory;
pub mod invoker;
pub mod kwargs;
pub mod models;
pub mod parameters;
pub mod parser;
pub mod plugins;
pub mod scheduler;
pub mod sectionparser;
pub mod services;
pub mod submitters;
pub mod summarize;
pub mod timeperiod;
pub mod value_store;

pub use checking::{CheckingEngine, HostCheckRequest};
pub use checkresults::{ActiveCheckResult, MetricTuple, ServiceCheckResult, State};
pub use cluster_mode::ClusterMode;
pub use config::{EngineSettings, ExitSpec};
pub use context::{CancellationToken, CheckContext, InvocationLocks};
pub use crash_reporting::CrashReporter;
pub use errors::{CheckError, EngineError};
pub use fetcher::{FetchError, Fetcher, FetcherType, SourceInfo};
pub use invoker::{get_aggregated_result, AggregatedResult, CheckEnvironment};
pub use kwargs::HostTopology;
pub use models::{
    CheckPluginName, HostKey, HostName, ParsedSectionName, RunPluginNames, SectionName, SourceType,
    TimeperiodName,
};
pub use parameters::{Parameters, TimespecificParameters};
pub use parser::{AgentParser, HostSections, Parser};
pub use plugins::{CheckArgs, CheckOutput, CheckPlugin, CheckPluginRegistry, SubResult};
pub use scheduler::check_host_services;
pub use sectionparser::{make_providers, ProviderRegistry, SectionCatalog, SectionPlugin, SectionProvider};
pub use services::ConfiguredService;
pub use submitters::{LogSubmitter, Submittee, Submitter};
pub use summarize::{SourceSummarizer, Summarizer};
pub use timeperiod::{TimeperiodOracle, TimeperiodRegistry};
pub use value_store::ValueStoreManager;
