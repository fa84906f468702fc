use serde::{Deserialize, Serialize};

use crate::indexer::{IndexerId, IndexerImplementation, ProviderDefinition, SyncLevel};
use crate::orchestrator::OrchestratorConfig;
use crate::status::BackoffConfig;
use crate::sync::{ApplicationDefinition, ApplicationId, ApplicationImplementation, FeedSettings};
use crate::transport::TransportConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Shared by the indexer and application status trackers.
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub indexers: Vec<ProviderDefinition>,
    #[serde(default)]
    pub applications: Vec<ApplicationDefinition>,
}

/// Downstream sync configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Capacity of the sync event channel (default: 64)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// URL applications use to reach the Torznab feeds.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            public_url: default_public_url(),
            api_key: None,
        }
    }
}

fn default_buffer_size() -> usize {
    64
}

fn default_public_url() -> String {
    "http://localhost:9696".to_string()
}

impl SyncConfig {
    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            public_url: self.public_url.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Sanitized config for display (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub orchestrator: OrchestratorConfig,
    pub backoff: BackoffConfig,
    pub transport: TransportConfig,
    pub sync: SanitizedSyncConfig,
    pub logging: LoggingConfig,
    pub indexers: Vec<SanitizedIndexer>,
    pub applications: Vec<SanitizedApplication>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSyncConfig {
    pub buffer_size: usize,
    pub public_url: String,
    pub api_key_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedIndexer {
    pub id: IndexerId,
    pub name: String,
    pub implementation: IndexerImplementation,
    pub base_url: String,
    pub enabled: bool,
    pub sync_level: SyncLevel,
    pub api_key_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedApplication {
    pub id: ApplicationId,
    pub name: String,
    pub implementation: ApplicationImplementation,
    pub base_url: String,
    pub enabled: bool,
    pub sync_level: SyncLevel,
    pub api_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            orchestrator: config.orchestrator.clone(),
            backoff: config.backoff.clone(),
            transport: config.transport.clone(),
            sync: SanitizedSyncConfig {
                buffer_size: config.sync.buffer_size,
                public_url: config.sync.public_url.clone(),
                api_key_configured: config.sync.api_key.as_ref().is_some_and(|k| !k.is_empty()),
            },
            logging: config.logging.clone(),
            indexers: config
                .indexers
                .iter()
                .map(|i| SanitizedIndexer {
                    id: i.id,
                    name: i.name.clone(),
                    implementation: i.implementation,
                    base_url: i.base_url().to_string(),
                    enabled: i.enabled,
                    sync_level: i.sync_level,
                    api_key_configured: i.api_key.as_ref().is_some_and(|k| !k.is_empty()),
                })
                .collect(),
            applications: config
                .applications
                .iter()
                .map(|a| SanitizedApplication {
                    id: a.id,
                    name: a.name.clone(),
                    implementation: a.implementation,
                    base_url: a.base_url.clone(),
                    enabled: a.enabled,
                    sync_level: a.sync_level,
                    api_key_configured: !a.api_key.is_empty(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[orchestrator]
max_concurrent_requests = 4

[backoff]
rate_limit_secs = 600

[backoff.connection]
initial_secs = 30
factor = 3
max_secs = 900

[sync]
public_url = "http://harvester:9696"
api_key = "feed-secret"

[logging]
format = "json"

[[indexers]]
id = 1
name = "1337x"
implementation = "jackett"
base_urls = ["http://jackett:9117/api/v2.0/indexers/1337x"]
api_key = "jackett-secret"

[[indexers]]
id = 2
name = "Orpheus"
implementation = "gazelle"
base_urls = ["https://orpheus.network"]
privacy = "private"
sync_level = "add_only"

[[applications]]
id = 1
name = "Sonarr"
implementation = "sonarr"
base_url = "http://sonarr:8989"
api_key = "sonarr-secret"
"#;

    #[test]
    fn test_deserialize_full_config() {
        let config: Config = toml::from_str(FULL).unwrap();
        assert_eq!(config.orchestrator.max_concurrent_requests, 4);
        assert_eq!(config.orchestrator.search_timeout_secs, 30); // default
        assert_eq!(config.backoff.rate_limit_secs, 600);
        assert_eq!(config.backoff.connection.initial_secs, 30);
        assert_eq!(config.backoff.failure, BackoffConfig::default().failure);
        assert_eq!(config.sync.buffer_size, 64);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.indexers.len(), 2);
        assert_eq!(config.indexers[1].sync_level, SyncLevel::AddOnly);
        assert_eq!(config.applications[0].implementation, ApplicationImplementation::Sonarr);
    }

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.orchestrator, OrchestratorConfig::default());
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.sync.public_url, "http://localhost:9696");
        assert!(config.indexers.is_empty());
    }

    #[test]
    fn test_unknown_implementation_fails() {
        let toml = r#"
[[indexers]]
id = 1
name = "x"
implementation = "cardigann"
base_urls = ["http://x"]
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_sanitized_config_hides_keys() {
        let config: Config = toml::from_str(FULL).unwrap();
        let sanitized = SanitizedConfig::from(&config);

        assert!(sanitized.sync.api_key_configured);
        assert!(sanitized.indexers[0].api_key_configured);
        assert!(!sanitized.indexers[1].api_key_configured);
        assert!(sanitized.applications[0].api_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
    }
}
