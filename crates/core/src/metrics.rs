//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Query orchestration (per-indexer outcomes, durations, result counts)
//! - Status tracking (recorded failures by class)
//! - Downstream sync (pushes by action and outcome)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Query orchestration
// =============================================================================

/// Indexer queries total by indexer and outcome.
pub static INDEXER_QUERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("harvester_indexer_queries_total", "Total indexer queries"),
        &["indexer", "outcome"], // "ok", "empty", "failed", "skipped"
    )
    .unwrap()
});

/// Per-indexer query duration in seconds.
pub static QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "harvester_indexer_query_duration_seconds",
            "Duration of a single indexer query",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["indexer"],
    )
    .unwrap()
});

/// Merged results per search.
pub static SEARCH_RESULTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("harvester_search_results", "Number of merged results per search")
            .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Status tracking
// =============================================================================

/// Failures recorded by tracker and failure class.
pub static STATUS_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "harvester_status_failures_total",
            "Total failures recorded by status trackers",
        ),
        &["tracker", "class"],
    )
    .unwrap()
});

// =============================================================================
// Downstream sync
// =============================================================================

/// Pushes to downstream applications by action and result.
pub static SYNC_PUSHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "harvester_sync_pushes_total",
            "Total indexer pushes to downstream applications",
        ),
        &["action", "result"], // "add"/"update"/"remove", "success"/"failed"
    )
    .unwrap()
});

/// All metrics for registration with a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(INDEXER_QUERIES.clone()),
        Box::new(QUERY_DURATION.clone()),
        Box::new(SEARCH_RESULTS.clone()),
        Box::new(STATUS_FAILURES.clone()),
        Box::new(SYNC_PUSHES.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        INDEXER_QUERIES.with_label_values(&["x", "ok"]).inc();
        assert!(!registry.gather().is_empty());
    }
}
