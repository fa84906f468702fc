pub mod config;
pub mod indexer;
pub mod metrics;
pub mod orchestrator;
pub mod status;
pub mod sync;
pub mod testing;
pub mod transport;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LogFormat,
    SanitizedConfig,
};
pub use indexer::{
    build_indexer, CanonicalResult, IndexerError, IndexerId, IndexerRegistry,
    ProviderDefinition, SearchCriteria, StandardCategory, SyncLevel,
};
pub use orchestrator::{OrchestratorConfig, QueryOrchestrator, SearchOutcome};
pub use status::{BackoffConfig, FailureClass, HealthState, StatusTracker};
pub use sync::{
    create_sync_system, ApplicationDefinition, ApplicationRegistry, ArrApplication, SyncEvent,
    SyncHandle, SyncReport, SyncService,
};
pub use transport::{HttpTransport, Transport, TransportError};
