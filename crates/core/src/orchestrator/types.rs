//! Search outcome and per-indexer diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::indexer::{CanonicalResult, IndexerId};

/// What happened to one indexer during a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DiagnosticOutcome {
    /// Queried and contributed results.
    Ok { results: usize },
    /// Queried successfully but returned nothing.
    Empty,
    /// Generator issued no requests for these criteria.
    NoRequests,
    /// Criteria type not among the declared capabilities.
    Unsupported,
    /// Skipped: suspended by the status tracker.
    Suspended {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until: Option<DateTime<Utc>>,
    },
    /// Pipeline failed; the failure was recorded with the status tracker.
    Failed {
        /// Error kind (transport, rate_limited, protocol, deadline, unclassified).
        kind: String,
        /// Failure class used for backoff.
        class: String,
        error: String,
        /// Backoff applied by the tracker.
        retry_in_secs: u64,
    },
}

impl DiagnosticOutcome {
    /// True when the indexer was actually queried.
    pub fn was_queried(&self) -> bool {
        matches!(self, Self::Ok { .. } | Self::Empty | Self::Failed { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDiagnostic {
    pub indexer_id: IndexerId,
    pub indexer: String,
    #[serde(flatten)]
    pub outcome: DiagnosticOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Result of an aggregate search. Always produced, even when every indexer failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Merged results, newest first.
    pub results: Vec<CanonicalResult>,
    /// One entry per enabled indexer, in id order.
    pub diagnostics: Vec<ProviderDiagnostic>,
    pub duration_ms: u64,
}

impl SearchOutcome {
    pub fn diagnostic(&self, id: IndexerId) -> Option<&ProviderDiagnostic> {
        self.diagnostics.iter().find(|d| d.indexer_id == id)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProviderDiagnostic> {
        self.diagnostics.iter().filter(|d| d.outcome.is_failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_serializes_flat() {
        let diagnostic = ProviderDiagnostic {
            indexer_id: 1,
            indexer: "one".to_string(),
            outcome: DiagnosticOutcome::Failed {
                kind: "protocol".to_string(),
                class: "generic".to_string(),
                error: "HTTP 503".to_string(),
                retry_in_secs: 300,
            },
            duration_ms: Some(12),
        };
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["retry_in_secs"], 300);
        assert_eq!(json["indexer"], "one");
    }

    #[test]
    fn test_was_queried() {
        assert!(DiagnosticOutcome::Empty.was_queried());
        assert!(!DiagnosticOutcome::Unsupported.was_queried());
        assert!(!DiagnosticOutcome::Suspended { until: None }.was_queried());
    }
}
