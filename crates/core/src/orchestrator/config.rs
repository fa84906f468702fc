//! Orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the query orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum outbound requests in flight across all indexers.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Deadline for a whole search (seconds).
    /// Indexers still running when it passes are abandoned.
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,

    /// Pages fetched per indexer at most.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

fn default_max_concurrent_requests() -> usize {
    8
}

fn default_search_timeout() -> u64 {
    30
}

fn default_max_pages() -> usize {
    10
}

impl OrchestratorConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
            search_timeout_secs: default_search_timeout(),
            max_pages: default_max_pages(),
        }
    }
}
