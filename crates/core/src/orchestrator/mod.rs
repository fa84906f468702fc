//! Query orchestrator for fan-out searches.
//!
//! A search runs every eligible indexer concurrently:
//! - **Selection**: enabled, capable, and not suspended by the status tracker
//! - **Pipeline**: generate pages, execute requests (bounded), parse
//! - **Aggregation**: stable merge by descending publish date
//!
//! Indexer failures never fail the search. They become status-tracker
//! transitions plus a diagnostic entry in the [`SearchOutcome`].

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::QueryOrchestrator;
pub use types::{DiagnosticOutcome, ProviderDiagnostic, SearchOutcome};
