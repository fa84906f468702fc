//! Mock downstream application for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::indexer::IndexerId;
use crate::sync::{Application, ApplicationDefinition, ApplicationError, IndexerPush, RemoteId};

/// A recorded push for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationCall {
    Add(IndexerPush),
    Update(RemoteId, IndexerPush),
    Remove(RemoteId),
}

/// Mock implementation of the Application trait.
///
/// Keeps the pushed indexers in memory, keyed by the remote ids it hands
/// out. Remote ids start at 1 and are never reused.
///
/// # Example
///
/// ```rust,ignore
/// let app = Arc::new(MockApplication::new(fixtures::application_definition(
///     1, "sonarr", SyncLevel::FullSync,
/// )));
/// app.fail_next(ApplicationError::Unclassified("boom".into())).await;
/// ```
pub struct MockApplication {
    definition: ApplicationDefinition,
    remote: Arc<RwLock<HashMap<RemoteId, IndexerPush>>>,
    calls: Arc<RwLock<Vec<ApplicationCall>>>,
    /// If set, the next push fails with this error.
    next_error: Arc<RwLock<Option<ApplicationError>>>,
    /// If set, the next listing fails with this error.
    list_error: Arc<RwLock<Option<ApplicationError>>>,
    next_id: AtomicU64,
}

impl MockApplication {
    pub fn new(definition: ApplicationDefinition) -> Self {
        Self {
            definition,
            remote: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            list_error: Arc::new(RwLock::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start from a roster pushed by an earlier run.
    pub async fn seed(&self, remote_id: RemoteId, indexer: IndexerPush) {
        self.remote.write().await.insert(remote_id, indexer);
        self.next_id.fetch_max(remote_id + 1, Ordering::SeqCst);
    }

    /// Indexers currently present on the application side.
    pub async fn remote_indexers(&self) -> HashMap<RemoteId, IndexerPush> {
        self.remote.read().await.clone()
    }

    pub async fn calls(&self) -> Vec<ApplicationCall> {
        self.calls.read().await.clone()
    }

    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }

    pub async fn fail_next(&self, error: ApplicationError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn fail_next_listing(&self, error: ApplicationError) {
        *self.list_error.write().await = Some(error);
    }

    async fn record(&self, call: ApplicationCall) -> Result<(), ApplicationError> {
        self.calls.write().await.push(call);
        match self.next_error.write().await.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Application for MockApplication {
    fn definition(&self) -> &ApplicationDefinition {
        &self.definition
    }

    async fn add_indexer(&self, indexer: &IndexerPush) -> Result<RemoteId, ApplicationError> {
        self.record(ApplicationCall::Add(indexer.clone())).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.remote.write().await.insert(id, indexer.clone());
        Ok(id)
    }

    async fn update_indexer(
        &self,
        remote_id: RemoteId,
        indexer: &IndexerPush,
    ) -> Result<(), ApplicationError> {
        self.record(ApplicationCall::Update(remote_id, indexer.clone()))
            .await?;
        let mut remote = self.remote.write().await;
        match remote.get_mut(&remote_id) {
            Some(existing) => {
                *existing = indexer.clone();
                Ok(())
            }
            None => Err(ApplicationError::Unclassified(format!(
                "no indexer with id {}",
                remote_id
            ))),
        }
    }

    async fn remove_indexer(&self, remote_id: RemoteId) -> Result<(), ApplicationError> {
        self.record(ApplicationCall::Remove(remote_id)).await?;
        self.remote.write().await.remove(&remote_id);
        Ok(())
    }

    /// Not recorded as a call and never consumes a push failure.
    async fn list_indexers(&self) -> Result<HashMap<IndexerId, RemoteId>, ApplicationError> {
        if let Some(e) = self.list_error.write().await.take() {
            return Err(e);
        }
        Ok(self
            .remote
            .read()
            .await
            .iter()
            .map(|(remote, push)| (push.indexer_id, *remote))
            .collect())
    }
}
