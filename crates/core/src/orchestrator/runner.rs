//! Query orchestrator implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::indexer::{
    merge_by_publish_date, CanonicalResult, Indexer, IndexerError, IndexerId, IndexerRegistry,
    IndexerRequest, PageFeedback, RequestChain, ResponseEnvelope, SearchCriteria,
};
use crate::metrics;
use crate::status::{Classify, FailureClass, StatusTracker};
use crate::transport::Transport;

use super::config::OrchestratorConfig;
use super::types::{DiagnosticOutcome, ProviderDiagnostic, SearchOutcome};

/// Runs searches across every eligible indexer.
pub struct QueryOrchestrator {
    config: OrchestratorConfig,
    registry: Arc<IndexerRegistry>,
    transport: Arc<dyn Transport>,
    status: Arc<StatusTracker<IndexerId>>,
    permits: Arc<Semaphore>,
}

impl QueryOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<IndexerRegistry>,
        transport: Arc<dyn Transport>,
        status: Arc<StatusTracker<IndexerId>>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));
        Self {
            config,
            registry,
            transport,
            status,
            permits,
        }
    }

    pub fn registry(&self) -> &Arc<IndexerRegistry> {
        &self.registry
    }

    pub fn status(&self) -> &Arc<StatusTracker<IndexerId>> {
        &self.status
    }

    /// Drop an indexer and its failure history.
    pub fn remove_indexer(&self, id: IndexerId) -> Option<Arc<dyn Indexer>> {
        let removed = self.registry.remove(id);
        if self.status.remove(&id) {
            debug!(indexer_id = id, "Cleared indexer status");
        }
        removed
    }

    /// Search every enabled indexer. Never fails; see the diagnostics.
    pub async fn search(&self, criteria: &SearchCriteria) -> SearchOutcome {
        let start = Instant::now();
        let now = self.status.now();
        let deadline = tokio::time::Instant::now() + self.config.search_timeout();

        let mut diagnostics = Vec::new();
        let mut selected: Vec<(Arc<dyn Indexer>, RequestChain)> = Vec::new();

        for indexer in self.registry.enabled() {
            let id = indexer.id();
            if !indexer.supports(criteria) {
                debug!(indexer = %indexer.name(), "Criteria type not supported, skipping");
                diagnostics.push(skipped(indexer.as_ref(), DiagnosticOutcome::Unsupported));
                continue;
            }
            if !self.status.is_eligible(&id, now) {
                let until = self.status.status(&id).and_then(|s| s.earliest_retry);
                debug!(indexer = %indexer.name(), until = ?until, "Indexer suspended, skipping");
                metrics::INDEXER_QUERIES
                    .with_label_values(&[indexer.name(), "skipped"])
                    .inc();
                diagnostics.push(skipped(indexer.as_ref(), DiagnosticOutcome::Suspended { until }));
                continue;
            }

            let chain = indexer.generator().generate(criteria);
            if chain.is_empty() {
                debug!(indexer = %indexer.name(), "Generator issued no requests");
                diagnostics.push(skipped(indexer.as_ref(), DiagnosticOutcome::NoRequests));
                continue;
            }
            selected.push((indexer, chain));
        }

        debug!(
            indexers = selected.len(),
            term = %criteria.base().term,
            "Starting parallel search"
        );

        let searches = selected.into_iter().map(|(indexer, chain)| async move {
            let started = Instant::now();
            let result = match tokio::time::timeout_at(
                deadline,
                self.query_indexer(indexer.as_ref(), chain),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(IndexerError::DeadlineExceeded(self.config.search_timeout())),
            };
            (indexer, result, started.elapsed())
        });

        let mut sequences = Vec::new();
        for (indexer, result, elapsed) in join_all(searches).await {
            metrics::QUERY_DURATION
                .with_label_values(&[indexer.name()])
                .observe(elapsed.as_secs_f64());
            let outcome = match result {
                Ok(results) => {
                    let outcome = self.on_success(indexer.as_ref(), results.len());
                    sequences.push(results);
                    outcome
                }
                Err(e) => self.on_failure(indexer.as_ref(), &e),
            };
            diagnostics.push(ProviderDiagnostic {
                indexer_id: indexer.id(),
                indexer: indexer.name().to_string(),
                outcome,
                duration_ms: Some(elapsed.as_millis() as u64),
            });
        }
        diagnostics.sort_by_key(|d| d.indexer_id);

        let base = criteria.base();
        let mut results = merge_by_publish_date(sequences);
        if base.offset > 0 {
            results.drain(..(base.offset as usize).min(results.len()));
        }
        if let Some(limit) = base.limit {
            results.truncate(limit as usize);
        }
        metrics::SEARCH_RESULTS
            .with_label_values(&[])
            .observe(results.len() as f64);

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            results = results.len(),
            failed = diagnostics.iter().filter(|d| d.outcome.is_failure()).count(),
            duration_ms = duration_ms,
            "Search complete"
        );

        SearchOutcome {
            results,
            diagnostics,
            duration_ms,
        }
    }

    fn on_success(&self, indexer: &dyn Indexer, count: usize) -> DiagnosticOutcome {
        self.status.record_success(&indexer.id());
        if count == 0 {
            warn!(indexer = %indexer.name(), "Indexer returned no results");
            metrics::INDEXER_QUERIES
                .with_label_values(&[indexer.name(), "empty"])
                .inc();
            DiagnosticOutcome::Empty
        } else {
            metrics::INDEXER_QUERIES
                .with_label_values(&[indexer.name(), "ok"])
                .inc();
            DiagnosticOutcome::Ok { results: count }
        }
    }

    fn on_failure(&self, indexer: &dyn Indexer, e: &IndexerError) -> DiagnosticOutcome {
        let class = e.failure_class();
        if class == FailureClass::Unclassified {
            error!(indexer = %indexer.name(), error = %e, "Unclassified indexer failure");
        } else {
            warn!(
                indexer = %indexer.name(),
                kind = e.kind(),
                error = %e,
                "Indexer search failed"
            );
        }
        metrics::INDEXER_QUERIES
            .with_label_values(&[indexer.name(), "failed"])
            .inc();

        let backoff = self
            .status
            .record_classified(&indexer.id(), class, &e.to_string());
        DiagnosticOutcome::Failed {
            kind: e.kind().to_string(),
            class: class.as_str().to_string(),
            error: e.to_string(),
            retry_in_secs: backoff.as_secs(),
        }
    }

    /// One indexer's pipeline: pages in chain order, requests within a page concurrently.
    async fn query_indexer(
        &self,
        indexer: &dyn Indexer,
        mut chain: RequestChain,
    ) -> Result<Vec<CanonicalResult>, IndexerError> {
        let parser = indexer.parser();
        let mut sequences = Vec::new();
        let mut feedback: Option<PageFeedback> = None;

        for page_index in 0..self.config.max_pages {
            let Some(page) = chain.next_page(feedback.as_ref()) else {
                break;
            };
            debug!(
                indexer = %indexer.name(),
                page = page_index,
                requests = page.len(),
                "Dispatching page"
            );

            let responses = join_all(page.iter().map(|request| self.execute(request))).await;

            let mut page_results = 0;
            let mut total_pages: Option<u32> = None;
            for response in responses {
                let envelope = response?;
                let parsed = parser.parse(&envelope)?;
                if let Some(total) = parser.total_pages(&envelope) {
                    total_pages = Some(total_pages.map_or(total, |t| t.max(total)));
                }
                page_results += parsed.len();
                sequences.push(parsed);
            }

            feedback = Some(PageFeedback {
                page_index,
                results: page_results,
                total_pages,
            });
        }

        Ok(merge_by_publish_date(sequences))
    }

    async fn execute(&self, request: &IndexerRequest) -> Result<ResponseEnvelope, IndexerError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| IndexerError::Unclassified("request pool closed".to_string()))?;
        debug!(method = ?request.method, url = %redact(&request.url), "Executing request");
        Ok(self.transport.execute(request).await?)
    }

    /// Deadline applied to a whole search.
    pub fn search_timeout(&self) -> Duration {
        self.config.search_timeout()
    }
}

fn skipped(indexer: &dyn Indexer, outcome: DiagnosticOutcome) -> ProviderDiagnostic {
    ProviderDiagnostic {
        indexer_id: indexer.id(),
        indexer: indexer.name().to_string(),
        outcome,
        duration_ms: None,
    }
}

/// Strip query parameter values that carry credentials.
fn redact(url: &str) -> String {
    let Some((path, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let params: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if name.eq_ignore_ascii_case("apikey") => format!("{}=***", name),
            _ => pair.to_string(),
        })
        .collect();
    format!("{}?{}", path, params.join("&"))
}
