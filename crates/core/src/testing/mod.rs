//! Testing utilities and mock implementations.
//!
//! Mocks for the two outbound seams (the HTTP transport and downstream
//! applications), a controllable clock, and fixtures shaped like real
//! indexer payloads.
//!
//! # Example
//!
//! ```rust,ignore
//! use harvester_core::testing::{fixtures, MockTransport};
//!
//! let transport = MockTransport::new();
//! transport
//!     .respond_json("/indexers/one/", json!({"Results": [fixtures::jackett_hit("x", "2024-01-01T00:00:00Z")]}))
//!     .await;
//! ```

mod clock;
mod mock_application;
mod mock_transport;

pub use clock::ManualClock;
pub use mock_application::{ApplicationCall, MockApplication};
pub use mock_transport::MockTransport;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};

    use crate::indexer::{
        CanonicalResult, IndexerId, IndexerImplementation, Privacy, ProviderDefinition,
        StandardCategory, SyncLevel,
    };
    use crate::sync::{ApplicationDefinition, ApplicationId, ApplicationImplementation};

    /// Create a canonical result with reasonable defaults.
    pub fn result(title: &str, publish_date: DateTime<Utc>) -> CanonicalResult {
        CanonicalResult {
            guid: CanonicalResult::derive_guid(1, title),
            indexer_id: 1,
            indexer: "fixture".to_string(),
            title: title.to_string(),
            download_url: Some(format!("http://fixture/download/{}", title)),
            magnet_uri: None,
            info_url: None,
            info_hash: None,
            size_bytes: 1024 * 1024 * 100, // 100 MB
            seeders: Some(10),
            peers: Some(12),
            grabs: None,
            files: None,
            publish_date,
            categories: vec![StandardCategory::MOVIES],
            freeleech: false,
        }
    }

    /// A Jackett feed that answers under `/indexers/{name}/results`.
    pub fn jackett_definition(id: IndexerId, name: &str) -> ProviderDefinition {
        ProviderDefinition {
            id,
            name: name.to_string(),
            implementation: IndexerImplementation::Jackett,
            base_urls: vec![format!("http://jackett:9117/api/v2.0/indexers/{}", name)],
            api_key: Some("jackett-key".to_string()),
            enabled: true,
            privacy: Privacy::Public,
            sync_level: SyncLevel::FullSync,
            categories: Vec::new(),
            fallback_category: None,
            search_types: None,
        }
    }

    pub fn gazelle_definition(id: IndexerId, name: &str) -> ProviderDefinition {
        ProviderDefinition {
            id,
            name: name.to_string(),
            implementation: IndexerImplementation::Gazelle,
            base_urls: vec![format!("https://{}.example", name)],
            api_key: Some("gazelle-key".to_string()),
            enabled: true,
            privacy: Privacy::Private,
            sync_level: SyncLevel::FullSync,
            categories: Vec::new(),
            fallback_category: None,
            search_types: None,
        }
    }

    /// One entry of a Jackett `Results` array.
    pub fn jackett_hit(title: &str, publish_date: &str) -> Value {
        json!({
            "Title": title,
            "Guid": format!("http://tracker/details/{}", title),
            "Link": format!("http://jackett:9117/dl/{}.torrent", title),
            "Details": format!("http://tracker/details/{}", title),
            "Size": 734003200u64,
            "Seeders": 12,
            "Peers": 15,
            "Category": [2000],
            "PublishDate": publish_date,
        })
    }

    /// A flat (non-music) Gazelle browse record.
    pub fn gazelle_flat(torrent_id: u64, group_name: &str, group_time: &str) -> Value {
        json!({
            "torrentId": torrent_id,
            "groupId": torrent_id + 1000,
            "groupName": group_name,
            "groupTime": group_time,
            "category": "E-Books",
            "size": "1048576",
            "snatches": "2",
            "fileCount": 1,
            "seeders": "5",
            "leechers": "3",
            "isFreeleech": false,
        })
    }

    /// A Sonarr instance at `http://{name}:8989` with key `{name}-key`.
    pub fn application_definition(
        id: ApplicationId,
        name: &str,
        sync_level: SyncLevel,
    ) -> ApplicationDefinition {
        ApplicationDefinition {
            id,
            name: name.to_string(),
            implementation: ApplicationImplementation::Sonarr,
            base_url: format!("http://{}:8989", name),
            api_key: format!("{}-key", name),
            enabled: true,
            sync_level,
            sync_categories: Vec::new(),
        }
    }
}
