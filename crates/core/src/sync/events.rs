use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ApplicationId;

/// Which roster a lifecycle event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// A content indexer.
    Indexer,
    /// A downstream application.
    Application,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderAction {
    Added,
    Updated,
    Removed,
}

/// Sync triggers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Configuration change for an indexer or an application.
    Provider {
        action: ProviderAction,
        provider_id: u32,
        provider_kind: ProviderKind,
    },
    /// Explicit resync of one application, or all when `application_id` is `None`.
    ManualSync {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        application_id: Option<ApplicationId>,
    },
}

impl SyncEvent {
    pub fn indexer(action: ProviderAction, id: u32) -> Self {
        Self::Provider {
            action,
            provider_id: id,
            provider_kind: ProviderKind::Indexer,
        }
    }

    pub fn application(action: ProviderAction, id: ApplicationId) -> Self {
        Self::Provider {
            action,
            provider_id: id,
            provider_kind: ProviderKind::Application,
        }
    }

    pub fn manual_all() -> Self {
        Self::ManualSync {
            application_id: None,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Provider {
                action,
                provider_kind,
                ..
            } => match (provider_kind, action) {
                (ProviderKind::Indexer, ProviderAction::Added) => "indexer_added",
                (ProviderKind::Indexer, ProviderAction::Updated) => "indexer_updated",
                (ProviderKind::Indexer, ProviderAction::Removed) => "indexer_removed",
                (ProviderKind::Application, ProviderAction::Added) => "application_added",
                (ProviderKind::Application, ProviderAction::Updated) => "application_updated",
                (ProviderKind::Application, ProviderAction::Removed) => "application_removed",
            },
            Self::ManualSync { .. } => "manual_sync",
        }
    }
}

/// Envelope wrapping a sync event with metadata
#[derive(Debug, Clone)]
pub struct SyncEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: SyncEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_shape() {
        let event = SyncEvent::indexer(ProviderAction::Removed, 4);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "provider");
        assert_eq!(json["action"], "removed");
        assert_eq!(json["provider_id"], 4);
        assert_eq!(json["provider_kind"], "indexer");
        assert_eq!(event.event_type(), "indexer_removed");
    }

    #[test]
    fn test_manual_sync_roundtrip() {
        let event: SyncEvent = serde_json::from_str(r#"{"type": "manual_sync"}"#).unwrap();
        assert_eq!(event, SyncEvent::manual_all());
        assert_eq!(event.event_type(), "manual_sync");
    }
}
