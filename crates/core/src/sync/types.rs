//! Downstream application contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::indexer::{IndexerId, ProtocolError, ProviderDefinition, StandardCategory, SyncLevel};
use crate::status::{Classify, FailureClass};
use crate::transport::TransportError;

pub type ApplicationId = u32;

/// Id the application assigned to a pushed indexer.
pub type RemoteId = u64;

/// Supported *arr-style applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationImplementation {
    Sonarr,
    Radarr,
    Lidarr,
    Readarr,
}

impl ApplicationImplementation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sonarr => "sonarr",
            Self::Radarr => "radarr",
            Self::Lidarr => "lidarr",
            Self::Readarr => "readarr",
        }
    }

    /// REST API version segment.
    pub fn api_version(&self) -> &'static str {
        match self {
            Self::Sonarr | Self::Radarr => "v3",
            Self::Lidarr | Self::Readarr => "v1",
        }
    }

    /// Categories pushed when the definition declares none.
    pub fn default_categories(&self) -> Vec<StandardCategory> {
        match self {
            Self::Sonarr => vec![StandardCategory::TV],
            Self::Radarr => vec![StandardCategory::MOVIES],
            Self::Lidarr => vec![StandardCategory::AUDIO],
            Self::Readarr => vec![StandardCategory::BOOKS, StandardCategory::AUDIO_AUDIOBOOK],
        }
    }
}

/// Configured downstream application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDefinition {
    pub id: ApplicationId,
    pub name: String,
    pub implementation: ApplicationImplementation,
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub sync_level: SyncLevel,
    /// Only indexers offering one of these categories are pushed. Empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_categories: Vec<StandardCategory>,
}

fn default_enabled() -> bool {
    true
}

impl ApplicationDefinition {
    /// Level applied to one indexer: the lower of both sides.
    pub fn effective_level(&self, indexer: &ProviderDefinition) -> SyncLevel {
        self.sync_level.min(indexer.sync_level)
    }

    /// Whether an indexer offering `categories` passes the category filter.
    pub fn accepts(&self, categories: &[StandardCategory]) -> bool {
        self.sync_categories.is_empty()
            || categories.iter().any(|c| {
                self.sync_categories
                    .iter()
                    .any(|f| c.is_within(*f) || f.is_within(*c))
            })
    }
}

/// Errors pushing to a downstream application.
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Rate limited by application (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unclassified application error: {0}")]
    Unclassified(String),
}

impl ApplicationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::RateLimited { .. } => "rate_limited",
            Self::Protocol(_) => "protocol",
            Self::Unclassified(_) => "unclassified",
        }
    }
}

impl Classify for ApplicationError {
    fn failure_class(&self) -> FailureClass {
        match self {
            Self::Transport(TransportError::Other(_)) => FailureClass::Unclassified,
            Self::Transport(_) => FailureClass::Connection,
            Self::RateLimited { retry_after } => FailureClass::RateLimited {
                retry_after: *retry_after,
            },
            Self::Protocol(_) => FailureClass::Generic,
            Self::Unclassified(_) => FailureClass::Unclassified,
        }
    }
}

/// An indexer as pushed to an application.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerPush {
    pub indexer_id: IndexerId,
    pub name: String,
    /// Categories the application should query, already filtered.
    pub categories: Vec<StandardCategory>,
}

/// A downstream application that mirrors the indexer roster.
#[async_trait]
pub trait Application: Send + Sync {
    fn definition(&self) -> &ApplicationDefinition;

    fn id(&self) -> ApplicationId {
        self.definition().id
    }

    fn name(&self) -> &str {
        &self.definition().name
    }

    async fn add_indexer(&self, indexer: &IndexerPush) -> Result<RemoteId, ApplicationError>;

    async fn update_indexer(
        &self,
        remote_id: RemoteId,
        indexer: &IndexerPush,
    ) -> Result<(), ApplicationError>;

    async fn remove_indexer(&self, remote_id: RemoteId) -> Result<(), ApplicationError>;

    /// Indexers this service pushed earlier, by local id.
    ///
    /// Entries the application holds for anything else are left out.
    async fn list_indexers(&self) -> Result<HashMap<IndexerId, RemoteId>, ApplicationError>;
}

/// Applications keyed by id, iterated in id order.
#[derive(Default)]
pub struct ApplicationRegistry {
    entries: RwLock<BTreeMap<ApplicationId, Arc<dyn Application>>>,
}

impl ApplicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, application: Arc<dyn Application>) -> Option<Arc<dyn Application>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(application.id(), application)
    }

    pub fn remove(&self, id: ApplicationId) -> Option<Arc<dyn Application>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&id)
    }

    pub fn get(&self, id: ApplicationId) -> Option<Arc<dyn Application>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&id).cloned()
    }

    pub fn enabled(&self) -> Vec<Arc<dyn Application>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .values()
            .filter(|a| a.definition().enabled)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
