//! Background consumer applying sync events to downstream applications.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::indexer::{Indexer, IndexerId, IndexerRegistry, SyncLevel};
use crate::metrics;
use crate::status::{Classify, FailureClass, StatusTracker};

use super::{
    Application, ApplicationError, ApplicationId, ApplicationRegistry, IndexerPush,
    ProviderAction, ProviderKind, RemoteId, SyncEvent, SyncEventEnvelope, SyncHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushAction {
    Add,
    Update,
    Remove,
}

impl PushAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PushResult {
    Success,
    Failed { error: String, retry_in_secs: u64 },
    /// Application suspended by the status tracker.
    Skipped,
}

/// One attempted push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRecord {
    pub application_id: ApplicationId,
    pub indexer_id: IndexerId,
    pub action: PushAction,
    #[serde(flatten)]
    pub result: PushResult,
}

/// Pushes attempted while handling one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub pushes: Vec<PushRecord>,
}

impl SyncReport {
    pub fn for_application(&self, id: ApplicationId) -> Vec<&PushRecord> {
        self.pushes.iter().filter(|p| p.application_id == id).collect()
    }

    pub fn failed(&self) -> usize {
        self.pushes
            .iter()
            .filter(|p| matches!(p.result, PushResult::Failed { .. }))
            .count()
    }
}

/// Applies lifecycle events to every downstream application.
///
/// Events are handled one at a time, so the remote-id map needs no locking.
pub struct SyncService {
    rx: mpsc::Receiver<SyncEventEnvelope>,
    indexers: Arc<IndexerRegistry>,
    applications: Arc<ApplicationRegistry>,
    status: Arc<StatusTracker<ApplicationId>>,
    /// Remote ids per application, per local indexer.
    remote_ids: HashMap<ApplicationId, HashMap<IndexerId, RemoteId>>,
}

impl SyncService {
    pub fn new(
        rx: mpsc::Receiver<SyncEventEnvelope>,
        indexers: Arc<IndexerRegistry>,
        applications: Arc<ApplicationRegistry>,
        status: Arc<StatusTracker<ApplicationId>>,
    ) -> Self {
        Self {
            rx,
            indexers,
            applications,
            status,
            remote_ids: HashMap::new(),
        }
    }

    pub fn status(&self) -> &Arc<StatusTracker<ApplicationId>> {
        &self.status
    }

    /// Remote id an application assigned to an indexer, if pushed.
    pub fn remote_id(&self, application: ApplicationId, indexer: IndexerId) -> Option<RemoteId> {
        self.remote_ids
            .get(&application)
            .and_then(|m| m.get(&indexer))
            .copied()
    }

    /// Run the service, consuming events until every handle is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Sync service started");

        while let Some(envelope) = self.rx.recv().await {
            debug!(
                event = envelope.event.event_type(),
                emitted_at = %envelope.timestamp,
                "Handling sync event"
            );
            let report = self.handle_event(&envelope.event).await;
            if report.failed() > 0 {
                warn!(
                    event = envelope.event.event_type(),
                    pushes = report.pushes.len(),
                    failed = report.failed(),
                    "Sync event finished with failures"
                );
            }
        }

        info!("Sync service shutting down");
    }

    pub async fn handle_event(&mut self, event: &SyncEvent) -> SyncReport {
        let mut report = SyncReport::default();
        match *event {
            SyncEvent::Provider {
                action,
                provider_id,
                provider_kind: ProviderKind::Indexer,
            } => self.on_indexer_event(action, provider_id, &mut report).await,
            SyncEvent::Provider {
                action,
                provider_id,
                provider_kind: ProviderKind::Application,
            } => self.on_application_event(action, provider_id, &mut report).await,
            SyncEvent::ManualSync { application_id } => {
                let targets = match application_id {
                    Some(id) => self.applications.get(id).into_iter().collect(),
                    None => self.applications.enabled(),
                };
                info!(applications = targets.len(), "Manual sync");
                for application in targets {
                    self.full_sync(application.as_ref(), &mut report).await;
                }
            }
        }
        report
    }

    async fn on_indexer_event(
        &mut self,
        action: ProviderAction,
        indexer_id: IndexerId,
        report: &mut SyncReport,
    ) {
        for application in self.applications.enabled() {
            let app_id = application.id();
            let mapped = self.remote_id(app_id, indexer_id);

            match action {
                ProviderAction::Added => {
                    let Some(indexer) = self.indexers.get(indexer_id) else {
                        warn!(indexer_id, "Sync event for unknown indexer");
                        return;
                    };
                    let level = self.level(application.as_ref(), indexer.as_ref());
                    if level < SyncLevel::AddOnly || !self.wanted(application.as_ref(), indexer.as_ref()) {
                        continue;
                    }
                    match mapped {
                        None => self.add(application.as_ref(), indexer.as_ref(), report).await,
                        Some(remote) if level == SyncLevel::FullSync => {
                            self.update(application.as_ref(), indexer.as_ref(), remote, report)
                                .await
                        }
                        Some(_) => {}
                    }
                }
                ProviderAction::Updated => {
                    if application.definition().sync_level != SyncLevel::FullSync {
                        continue;
                    }
                    let Some(indexer) = self.indexers.get(indexer_id) else {
                        continue;
                    };
                    if self.level(application.as_ref(), indexer.as_ref()) != SyncLevel::FullSync {
                        continue;
                    }
                    let wanted = self.wanted(application.as_ref(), indexer.as_ref());
                    match (wanted, mapped) {
                        (true, Some(remote)) => {
                            self.update(application.as_ref(), indexer.as_ref(), remote, report)
                                .await
                        }
                        (true, None) => {
                            self.add(application.as_ref(), indexer.as_ref(), report).await
                        }
                        // Disabled or filtered out since the last push.
                        (false, Some(remote)) => {
                            self.remove(application.as_ref(), indexer_id, remote, report)
                                .await
                        }
                        (false, None) => {}
                    }
                }
                ProviderAction::Removed => {
                    if application.definition().sync_level != SyncLevel::FullSync {
                        continue;
                    }
                    if let Some(remote) = mapped {
                        self.remove(application.as_ref(), indexer_id, remote, report)
                            .await;
                    }
                }
            }
        }
    }

    async fn on_application_event(
        &mut self,
        action: ProviderAction,
        app_id: ApplicationId,
        report: &mut SyncReport,
    ) {
        match action {
            ProviderAction::Added | ProviderAction::Updated => {
                let Some(application) = self.applications.get(app_id) else {
                    warn!(application_id = app_id, "Sync event for unknown application");
                    return;
                };
                if !application.definition().enabled {
                    debug!(application = %application.name(), "Application disabled, skipping resync");
                    return;
                }
                self.full_sync(application.as_ref(), report).await;
            }
            ProviderAction::Removed => {
                self.remote_ids.remove(&app_id);
                self.status.remove(&app_id);
                info!(application_id = app_id, "Forgot removed application");
            }
        }
    }

    /// Bring one application in line with the current indexer roster.
    async fn full_sync(&mut self, application: &dyn Application, report: &mut SyncReport) {
        let app_id = application.id();
        info!(application = %application.name(), "Starting full sync");

        if !self.seed_remote_ids(application).await {
            return;
        }

        for indexer in self.indexers.all() {
            let level = self.level(application, indexer.as_ref());
            let wanted = self.wanted(application, indexer.as_ref());
            match (wanted, self.remote_id(app_id, indexer.id())) {
                (true, None) if level >= SyncLevel::AddOnly => {
                    self.add(application, indexer.as_ref(), report).await
                }
                (true, Some(remote)) if level == SyncLevel::FullSync => {
                    self.update(application, indexer.as_ref(), remote, report).await
                }
                (false, Some(remote)) if level == SyncLevel::FullSync => {
                    self.remove(application, indexer.id(), remote, report).await
                }
                _ => {}
            }
        }

        // Remote indexers whose local indexer is gone.
        if application.definition().sync_level == SyncLevel::FullSync {
            let orphans: Vec<(IndexerId, RemoteId)> = self
                .remote_ids
                .get(&app_id)
                .map(|m| {
                    m.iter()
                        .filter(|(id, _)| self.indexers.get(**id).is_none())
                        .map(|(id, remote)| (*id, *remote))
                        .collect()
                })
                .unwrap_or_default();
            for (indexer_id, remote) in orphans {
                self.remove(application, indexer_id, remote, report).await;
            }
        }

        info!(
            application = %application.name(),
            pushes = report.for_application(app_id).len(),
            "Full sync finished"
        );
    }

    /// Replace the remote-id map with what the application reports.
    ///
    /// Returns false when the listing failed; pushing blind would duplicate
    /// indexers added by an earlier run. A suspended application is not
    /// asked, its pushes are skipped anyway.
    async fn seed_remote_ids(&mut self, application: &dyn Application) -> bool {
        let app_id = application.id();
        if !self.status.is_eligible(&app_id, self.status.now()) {
            return true;
        }
        match application.list_indexers().await {
            Ok(listed) => {
                debug!(
                    application = %application.name(),
                    indexers = listed.len(),
                    "Listed remote indexers"
                );
                self.remote_ids.insert(app_id, listed);
                true
            }
            Err(e) => {
                warn!(
                    application = %application.name(),
                    kind = e.kind(),
                    error = %e,
                    "Failed to list remote indexers, skipping full sync"
                );
                self.status
                    .record_classified(&app_id, e.failure_class(), &e.to_string());
                false
            }
        }
    }

    fn level(&self, application: &dyn Application, indexer: &dyn Indexer) -> SyncLevel {
        application.definition().effective_level(indexer.definition())
    }

    /// Enabled and passing the application's category filter.
    fn wanted(&self, application: &dyn Application, indexer: &dyn Indexer) -> bool {
        self.indexers.is_enabled(indexer.id())
            && application
                .definition()
                .accepts(&indexer.capabilities().categories.standard_categories())
    }

    fn push_for(&self, application: &dyn Application, indexer: &dyn Indexer) -> IndexerPush {
        let offered = indexer.capabilities().categories.standard_categories();
        let filter = &application.definition().sync_categories;
        let categories = if filter.is_empty() {
            offered
        } else {
            offered
                .into_iter()
                .filter(|c| filter.iter().any(|f| c.is_within(*f) || f.is_within(*c)))
                .collect()
        };
        IndexerPush {
            indexer_id: indexer.id(),
            name: indexer.name().to_string(),
            categories,
        }
    }

    fn eligible(
        &self,
        application: &dyn Application,
        indexer_id: IndexerId,
        action: PushAction,
        report: &mut SyncReport,
    ) -> bool {
        let app_id = application.id();
        if self.status.is_eligible(&app_id, self.status.now()) {
            return true;
        }
        debug!(
            application = %application.name(),
            indexer_id,
            action = action.as_str(),
            "Application suspended, skipping push"
        );
        report.pushes.push(PushRecord {
            application_id: app_id,
            indexer_id,
            action,
            result: PushResult::Skipped,
        });
        false
    }

    async fn add(
        &mut self,
        application: &dyn Application,
        indexer: &dyn Indexer,
        report: &mut SyncReport,
    ) {
        if !self.eligible(application, indexer.id(), PushAction::Add, report) {
            return;
        }
        let push = self.push_for(application, indexer);
        let result = application.add_indexer(&push).await.map(|remote| {
            self.remote_ids
                .entry(application.id())
                .or_default()
                .insert(indexer.id(), remote);
        });
        self.settle(application, indexer.id(), PushAction::Add, result, report);
    }

    async fn update(
        &mut self,
        application: &dyn Application,
        indexer: &dyn Indexer,
        remote: RemoteId,
        report: &mut SyncReport,
    ) {
        if !self.eligible(application, indexer.id(), PushAction::Update, report) {
            return;
        }
        let push = self.push_for(application, indexer);
        let result = application.update_indexer(remote, &push).await;
        self.settle(application, indexer.id(), PushAction::Update, result, report);
    }

    async fn remove(
        &mut self,
        application: &dyn Application,
        indexer_id: IndexerId,
        remote: RemoteId,
        report: &mut SyncReport,
    ) {
        if !self.eligible(application, indexer_id, PushAction::Remove, report) {
            return;
        }
        let result = application.remove_indexer(remote).await.map(|()| {
            if let Some(map) = self.remote_ids.get_mut(&application.id()) {
                map.remove(&indexer_id);
            }
        });
        self.settle(application, indexer_id, PushAction::Remove, result, report);
    }

    /// Status bookkeeping for one push, mirroring the orchestrator's.
    fn settle(
        &self,
        application: &dyn Application,
        indexer_id: IndexerId,
        action: PushAction,
        result: Result<(), ApplicationError>,
        report: &mut SyncReport,
    ) {
        let app_id = application.id();
        let result = match result {
            Ok(()) => {
                self.status.record_success(&app_id);
                metrics::SYNC_PUSHES
                    .with_label_values(&[action.as_str(), "success"])
                    .inc();
                info!(
                    application = %application.name(),
                    indexer_id,
                    action = action.as_str(),
                    "Pushed indexer"
                );
                PushResult::Success
            }
            Err(e) => {
                let class = e.failure_class();
                if class == FailureClass::Unclassified {
                    error!(application = %application.name(), error = %e, "Unclassified application failure");
                } else {
                    warn!(
                        application = %application.name(),
                        indexer_id,
                        action = action.as_str(),
                        kind = e.kind(),
                        error = %e,
                        "Push to application failed"
                    );
                }
                metrics::SYNC_PUSHES
                    .with_label_values(&[action.as_str(), "failed"])
                    .inc();
                let backoff = self.status.record_classified(&app_id, class, &e.to_string());
                PushResult::Failed {
                    error: e.to_string(),
                    retry_in_secs: backoff.as_secs(),
                }
            }
        };
        report.pushes.push(PushRecord {
            application_id: app_id,
            indexer_id,
            action,
            result,
        });
    }
}

/// Create a complete sync system
///
/// Returns:
/// - `SyncHandle` - for emitting events (clone this to share across tasks)
/// - `SyncService` - spawn this as a background task with `tokio::spawn(service.run())`
pub fn create_sync_system(
    indexers: Arc<IndexerRegistry>,
    applications: Arc<ApplicationRegistry>,
    status: Arc<StatusTracker<ApplicationId>>,
    buffer_size: usize,
) -> (SyncHandle, SyncService) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    let handle = SyncHandle::new(tx);
    let service = SyncService::new(rx, indexers, applications, status);
    (handle, service)
}
