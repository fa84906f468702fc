//! Downstream sync: mirrors the indexer roster into applications.
//!
//! Lifecycle events are emitted through a [`SyncHandle`] and applied by a
//! single [`SyncService`] task. Every push goes through the same status
//! tracker machinery as indexer queries, keyed by application id.

mod arr;
mod events;
mod handle;
mod service;
mod types;

pub use arr::{ArrApplication, FeedSettings};
pub use events::{ProviderAction, ProviderKind, SyncEvent, SyncEventEnvelope};
pub use handle::SyncHandle;
pub use service::{create_sync_system, PushAction, PushRecord, PushResult, SyncReport, SyncService};
pub use types::{
    Application, ApplicationDefinition, ApplicationError, ApplicationId, ApplicationImplementation,
    ApplicationRegistry, IndexerPush, RemoteId,
};
