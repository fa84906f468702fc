use chrono::Utc;
use tokio::sync::mpsc;

use super::{SyncEvent, SyncEventEnvelope};

/// Handle for emitting sync events
///
/// Cheaply cloneable. Events go through a bounded channel to the
/// `SyncService`; emitters never wait on a push to a downstream application.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncEventEnvelope>,
}

impl SyncHandle {
    pub fn new(tx: mpsc::Sender<SyncEventEnvelope>) -> Self {
        Self { tx }
    }

    fn envelope(event: SyncEvent) -> SyncEventEnvelope {
        SyncEventEnvelope {
            timestamp: Utc::now(),
            event,
        }
    }

    /// Emit a sync event, waiting for channel capacity.
    ///
    /// A closed channel is logged, never returned to the caller.
    pub async fn emit(&self, event: SyncEvent) {
        if let Err(e) = self.tx.send(Self::envelope(event)).await {
            tracing::error!("Failed to emit sync event: {}", e);
        }
    }

    /// Emit from a context without a runtime.
    pub fn emit_blocking(&self, event: SyncEvent) {
        if let Err(e) = self.tx.blocking_send(Self::envelope(event)) {
            tracing::error!("Failed to emit sync event: {}", e);
        }
    }

    /// Returns false if the channel is full or closed.
    pub fn try_emit(&self, event: SyncEvent) -> bool {
        match self.tx.try_send(Self::envelope(event)) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to emit sync event: {}", e);
                false
            }
        }
    }
}
