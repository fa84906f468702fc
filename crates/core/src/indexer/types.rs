//! Types for the indexer query engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::categories::{CategoryMapping, StandardCategory};

/// Identifier of a configured indexer.
pub type IndexerId = u32;

/// A normalized search hit, identical in shape for every indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResult {
    /// Stable identifier of this hit.
    pub guid: String,
    /// Indexer that produced the hit.
    pub indexer_id: IndexerId,
    /// Display name of that indexer.
    pub indexer: String,
    pub title: String,
    /// .torrent download URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnet_uri: Option<String>,
    /// Details page on the indexer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_url: Option<String>,
    /// Info hash (lowercase hex) when the indexer reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<String>,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeders: Option<u32>,
    /// Seeders plus leechers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<u32>,
    /// Grab/snatch count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grabs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<u32>,
    /// Always UTC.
    pub publish_date: DateTime<Utc>,
    /// Standard taxonomy only, never native ids. Never empty.
    pub categories: Vec<StandardCategory>,
    #[serde(default)]
    pub freeleech: bool,
}

impl CanonicalResult {
    /// Derive a deterministic guid from the indexer id and its native id.
    pub fn derive_guid(indexer_id: IndexerId, native_id: &str) -> String {
        let digest = Sha256::digest(format!("{}:{}", indexer_id, native_id).as_bytes());
        let hex: String = digest.iter().take(16).map(|b| format!("{:02x}", b)).collect();
        format!("harvester-{}", hex)
    }
}

/// Searchable media kinds an indexer can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Search,
    Movie,
    Tv,
    Music,
    Book,
}

/// Fields shared by every criteria variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchBase {
    /// Sanitized free-text term. May be empty for browse-style queries.
    pub term: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<StandardCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

impl SearchBase {
    pub fn new(term: &str) -> Self {
        Self {
            term: sanitize_term(term),
            categories: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn with_categories(mut self, categories: Vec<StandardCategory>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Strip characters indexers choke on and collapse whitespace.
pub fn sanitize_term(term: &str) -> String {
    let kept: String = term
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || "-'.:&!+".contains(c) {
                c
            } else {
                ' '
            }
        })
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicSearch {
    #[serde(flatten)]
    pub base: SearchBase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieSearch {
    #[serde(flatten)]
    pub base: SearchBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TvSearch {
    #[serde(flatten)]
    pub base: SearchBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvdb_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicSearch {
    #[serde(flatten)]
    pub base: SearchBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSearch {
    #[serde(flatten)]
    pub base: SearchBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A structured search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchCriteria {
    Basic(BasicSearch),
    Movie(MovieSearch),
    Tv(TvSearch),
    Music(MusicSearch),
    Book(BookSearch),
}

impl SearchCriteria {
    /// Free-text search with no variant-specific fields.
    pub fn basic(term: &str) -> Self {
        Self::Basic(BasicSearch {
            base: SearchBase::new(term),
        })
    }

    pub fn base(&self) -> &SearchBase {
        match self {
            Self::Basic(c) => &c.base,
            Self::Movie(c) => &c.base,
            Self::Tv(c) => &c.base,
            Self::Music(c) => &c.base,
            Self::Book(c) => &c.base,
        }
    }

    pub fn search_type(&self) -> SearchType {
        match self {
            Self::Basic(_) => SearchType::Search,
            Self::Movie(_) => SearchType::Movie,
            Self::Tv(_) => SearchType::Tv,
            Self::Music(_) => SearchType::Music,
            Self::Book(_) => SearchType::Book,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

/// A single outbound HTTP intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl IndexerRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_json_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self.with_header("Content-Type", "application/json")
    }
}

/// An executed request with its raw reply.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub request: IndexerRequest,
    pub status: u16,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ResponseEnvelope {
    pub fn new(request: IndexerRequest, status: u16, body: impl Into<String>) -> Self {
        Self {
            request,
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Media type without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Built-in indexer implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexerImplementation {
    /// Gazelle-based private trackers (ajax.php JSON API).
    Gazelle,
    /// Jackett JSON results API.
    Jackett,
}

impl IndexerImplementation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gazelle => "gazelle",
            Self::Jackett => "jackett",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    #[default]
    Public,
    SemiPrivate,
    Private,
}

/// How much of the indexer roster a downstream application receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncLevel {
    Disabled,
    AddOnly,
    #[default]
    FullSync,
}

/// Configured identity and declarations of one indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDefinition {
    pub id: IndexerId,
    pub name: String,
    pub implementation: IndexerImplementation,
    /// Declared endpoints; the first one is used for queries.
    pub base_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub privacy: Privacy,
    /// Upper bound on how this indexer propagates to applications.
    #[serde(default)]
    pub sync_level: SyncLevel,
    /// Replaces the implementation's built-in category table when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_category: Option<StandardCategory>,
    /// Restricts the implementation's supported search types when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_types: Option<Vec<SearchType>>,
}

fn default_enabled() -> bool {
    true
}

impl ProviderDefinition {
    pub fn base_url(&self) -> &str {
        self.base_urls
            .first()
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_term() {
        assert_eq!(sanitize_term("  The   Beatles  "), "The Beatles");
        assert_eq!(sanitize_term("AC/DC (Live)"), "AC DC Live");
        assert_eq!(sanitize_term("Mötley Crüe"), "Mötley Crüe");
        assert_eq!(sanitize_term("Don't Stop!"), "Don't Stop!");
        assert_eq!(sanitize_term("\"\""), "");
    }

    #[test]
    fn test_derive_guid_is_deterministic() {
        let a = CanonicalResult::derive_guid(3, "12345");
        let b = CanonicalResult::derive_guid(3, "12345");
        let c = CanonicalResult::derive_guid(4, "12345");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("harvester-"));
        assert_eq!(a.len(), "harvester-".len() + 32);
    }

    #[test]
    fn test_search_criteria_deserialization() {
        let json = r#"{"type": "music", "term": "abbey road", "artist": "The Beatles"}"#;
        let criteria: SearchCriteria = serde_json::from_str(json).unwrap();
        assert_eq!(criteria.search_type(), SearchType::Music);
        assert_eq!(criteria.base().term, "abbey road");
        match criteria {
            SearchCriteria::Music(m) => assert_eq!(m.artist.as_deref(), Some("The Beatles")),
            _ => panic!("Expected music criteria"),
        }
    }

    #[test]
    fn test_envelope_content_type_strips_parameters() {
        let envelope = ResponseEnvelope::new(IndexerRequest::get("http://x"), 200, "{}")
            .with_header("Content-Type", "Application/JSON; charset=utf-8");
        assert_eq!(envelope.content_type().as_deref(), Some("application/json"));
        assert_eq!(envelope.header("CONTENT-TYPE"), Some("Application/JSON; charset=utf-8"));
    }

    #[test]
    fn test_provider_definition_defaults() {
        let toml = r#"
id = 7
name = "Example"
implementation = "gazelle"
base_urls = ["https://example.org/"]
"#;
        let def: ProviderDefinition = toml::from_str(toml).unwrap();
        assert!(def.enabled);
        assert_eq!(def.privacy, Privacy::Public);
        assert_eq!(def.sync_level, SyncLevel::FullSync);
        assert_eq!(def.base_url(), "https://example.org");
        assert!(def.categories.is_empty());
    }

    #[test]
    fn test_sync_level_ordering() {
        assert!(SyncLevel::Disabled < SyncLevel::AddOnly);
        assert!(SyncLevel::AddOnly < SyncLevel::FullSync);
    }
}
