//! *arr-style application client (Sonarr, Radarr, Lidarr, Readarr).
//!
//! Indexers are pushed as Torznab definitions pointing back at this
//! service's public feed URL.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::indexer::parse::parse_retry_after;
use crate::indexer::{HttpMethod, IndexerId, IndexerRequest, ProtocolError, ResponseEnvelope};
use crate::transport::Transport;

use super::{Application, ApplicationDefinition, ApplicationError, IndexerPush, RemoteId};

/// Where applications reach the Torznab feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSettings {
    /// Base URL, each indexer is served under `{public_url}/{indexer_id}/`.
    pub public_url: String,
    /// Key the application presents to the feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedIndexer {
    id: RemoteId,
}

#[derive(Debug, Deserialize)]
struct ListedIndexer {
    id: RemoteId,
    #[serde(default)]
    fields: Vec<ListedField>,
}

#[derive(Debug, Deserialize)]
struct ListedField {
    name: String,
    #[serde(default)]
    value: Value,
}

pub struct ArrApplication {
    definition: ApplicationDefinition,
    transport: Arc<dyn Transport>,
    feed: FeedSettings,
}

impl ArrApplication {
    pub fn new(
        definition: ApplicationDefinition,
        transport: Arc<dyn Transport>,
        feed: FeedSettings,
    ) -> Self {
        Self {
            definition,
            transport,
            feed,
        }
    }

    fn endpoint(&self, remote_id: Option<RemoteId>) -> String {
        let base = format!(
            "{}/api/{}/indexer",
            self.definition.base_url.trim_end_matches('/'),
            self.definition.implementation.api_version()
        );
        match remote_id {
            Some(id) => format!("{}/{}", base, id),
            None => base,
        }
    }

    fn request(&self, method: HttpMethod, url: String) -> IndexerRequest {
        IndexerRequest::get(url)
            .with_method(method)
            .with_header("X-Api-Key", self.definition.api_key.clone())
            .with_header("Accept", "application/json")
    }

    fn feed_url(&self, indexer_id: IndexerId) -> String {
        format!("{}/{}/", self.feed.public_url.trim_end_matches('/'), indexer_id)
    }

    /// Local indexer id behind a remote entry, if it points at our feed.
    fn local_id(&self, listed: &ListedIndexer) -> Option<IndexerId> {
        let base_url = listed
            .fields
            .iter()
            .find(|f| f.name == "baseUrl")?
            .value
            .as_str()?;
        let prefix = format!("{}/", self.feed.public_url.trim_end_matches('/'));
        base_url
            .strip_prefix(&prefix)?
            .trim_end_matches('/')
            .parse()
            .ok()
    }

    fn body(&self, remote_id: Option<RemoteId>, indexer: &IndexerPush) -> String {
        let categories = if indexer.categories.is_empty() {
            self.definition.implementation.default_categories()
        } else {
            indexer.categories.clone()
        };
        let mut fields = vec![
            json!({
                "name": "baseUrl",
                "value": self.feed_url(indexer.indexer_id),
            }),
            json!({"name": "apiPath", "value": "/api"}),
            json!({"name": "categories", "value": categories.iter().map(|c| c.0).collect::<Vec<_>>()}),
        ];
        if let Some(key) = &self.feed.api_key {
            fields.push(json!({"name": "apiKey", "value": key}));
        }

        let mut body = json!({
            "name": format!("{} (Harvester)", indexer.name),
            "implementation": "Torznab",
            "configContract": "TorznabSettings",
            "protocol": "torrent",
            "enableRss": true,
            "enableAutomaticSearch": true,
            "enableInteractiveSearch": true,
            "priority": 25,
            "fields": fields,
        });
        if let Some(id) = remote_id {
            body["id"] = json!(id);
        }
        body.to_string()
    }

    async fn send(&self, request: IndexerRequest) -> Result<ResponseEnvelope, ApplicationError> {
        debug!(
            application = %self.definition.name,
            method = ?request.method,
            url = %request.url,
            "Pushing to application"
        );
        let envelope = self.transport.execute(&request).await?;
        check_status(&envelope)?;
        Ok(envelope)
    }
}

fn check_status(envelope: &ResponseEnvelope) -> Result<(), ApplicationError> {
    if envelope.status == 429 {
        let retry_after = envelope
            .header("retry-after")
            .and_then(|v| parse_retry_after(v, Utc::now()));
        return Err(ApplicationError::RateLimited { retry_after });
    }
    if !envelope.is_success() {
        return Err(ProtocolError::UnexpectedStatus {
            status: envelope.status,
            excerpt: envelope.body.chars().take(200).collect(),
        }
        .into());
    }
    Ok(())
}

#[async_trait]
impl Application for ArrApplication {
    fn definition(&self) -> &ApplicationDefinition {
        &self.definition
    }

    async fn add_indexer(&self, indexer: &IndexerPush) -> Result<RemoteId, ApplicationError> {
        let request = self
            .request(HttpMethod::Post, self.endpoint(None))
            .with_json_body(self.body(None, indexer));
        let envelope = self.send(request).await?;
        let created: CreatedIndexer = serde_json::from_str(&envelope.body).map_err(|e| {
            ProtocolError::InvalidPayload(format!("Failed to parse created indexer: {}", e))
        })?;
        Ok(created.id)
    }

    async fn update_indexer(
        &self,
        remote_id: RemoteId,
        indexer: &IndexerPush,
    ) -> Result<(), ApplicationError> {
        let request = self
            .request(HttpMethod::Put, self.endpoint(Some(remote_id)))
            .with_json_body(self.body(Some(remote_id), indexer));
        self.send(request).await.map(|_| ())
    }

    async fn remove_indexer(&self, remote_id: RemoteId) -> Result<(), ApplicationError> {
        let request = self.request(HttpMethod::Delete, self.endpoint(Some(remote_id)));
        self.send(request).await.map(|_| ())
    }

    async fn list_indexers(&self) -> Result<HashMap<IndexerId, RemoteId>, ApplicationError> {
        let envelope = self
            .send(self.request(HttpMethod::Get, self.endpoint(None)))
            .await?;
        let listed: Vec<ListedIndexer> = serde_json::from_str(&envelope.body).map_err(|e| {
            ProtocolError::InvalidPayload(format!("Failed to parse indexer list: {}", e))
        })?;
        Ok(listed
            .iter()
            .filter_map(|entry| self.local_id(entry).map(|local| (local, entry.id)))
            .collect())
    }
}
