//! Jackett results API.
//!
//! The definition's base URL points at one Jackett indexer feed, e.g.
//! `http://jackett:9117/api/v2.0/indexers/1337x`.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

use crate::indexer::parse::{check_envelope, loose_bool, loose_u32, loose_u64, parse_timestamp, sort_by_publish_date};
use crate::indexer::{
    BasicSearch, BookSearch, CanonicalResult, Capabilities, CategoryMap, CategoryMapping,
    HttpIndexer, IndexerError, IndexerId, IndexerRequest, MovieSearch, MusicSearch,
    ProviderDefinition, RequestChain, RequestGenerator, ResponseEnvelope, ResponseParser,
    SearchBase, SearchType, StandardCategory, TvSearch,
};

const CONTENT_TYPE: &str = "application/json";

/// Jackett numbers tracker-specific categories from here up.
const CUSTOM_CATEGORY_BASE: u32 = 100_000;

pub type JackettIndexer = HttpIndexer<JackettRequestGenerator, JackettParser>;

/// Jackett reports standard numbers natively, so the table is an identity map.
pub fn default_categories() -> Vec<CategoryMapping> {
    [
        StandardCategory::CONSOLE,
        StandardCategory::MOVIES,
        StandardCategory::AUDIO,
        StandardCategory::PC,
        StandardCategory::TV,
        StandardCategory::XXX,
        StandardCategory::BOOKS,
        StandardCategory::OTHER,
    ]
    .into_iter()
    .map(|c| CategoryMapping::labelled(c.0.to_string(), c, c.name()))
    .collect()
}

pub fn build(definition: ProviderDefinition) -> JackettIndexer {
    let mappings = if definition.categories.is_empty() {
        default_categories()
    } else {
        definition.categories.clone()
    };
    let mut categories = CategoryMap::new(mappings);
    if let Some(fallback) = definition.fallback_category {
        categories = categories.with_fallback(fallback);
    }

    let capabilities = Capabilities {
        search_types: vec![
            SearchType::Search,
            SearchType::Movie,
            SearchType::Tv,
            SearchType::Music,
            SearchType::Book,
        ],
        categories: categories.clone(),
    };
    let generator = JackettRequestGenerator {
        base_url: definition.base_url().to_string(),
        api_key: definition.api_key.clone().unwrap_or_default(),
    };
    let parser = JackettParser {
        indexer_id: definition.id,
        indexer_name: definition.name.clone(),
        categories,
    };
    HttpIndexer::new(definition, capabilities, generator, parser)
}

pub struct JackettRequestGenerator {
    base_url: String,
    api_key: String,
}

impl JackettRequestGenerator {
    fn search_url(&self, base: &SearchBase, query: &str) -> String {
        let mut url = format!(
            "{}/results?apikey={}&Query={}",
            self.base_url,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(query)
        );
        for category in &base.categories {
            url.push_str(&format!("&Category[]={}", category.0));
        }
        url
    }

    fn request(&self, base: &SearchBase, parts: &[Option<String>]) -> RequestChain {
        let query = std::iter::once(Some(base.term.clone()))
            .chain(parts.iter().cloned())
            .flatten()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        RequestChain::single(
            IndexerRequest::get(self.search_url(base, &query)).with_header("Accept", CONTENT_TYPE),
        )
    }
}

impl RequestGenerator for JackettRequestGenerator {
    fn basic_search(&self, criteria: &BasicSearch) -> RequestChain {
        self.request(&criteria.base, &[])
    }

    fn movie_search(&self, criteria: &MovieSearch) -> RequestChain {
        let mut base = criteria.base.clone();
        if base.categories.is_empty() {
            base.categories = vec![StandardCategory::MOVIES];
        }
        let parts = [criteria.imdb_id.clone(), criteria.year.map(|y| y.to_string())];
        self.request(&base, &parts)
    }

    fn tv_search(&self, criteria: &TvSearch) -> RequestChain {
        let mut base = criteria.base.clone();
        if base.categories.is_empty() {
            base.categories = vec![StandardCategory::TV];
        }
        let episode = match (criteria.season, criteria.episode.as_deref()) {
            (Some(s), Some(e)) => match e.parse::<u32>() {
                Ok(e) => Some(format!("S{:02}E{:02}", s, e)),
                Err(_) => Some(format!("S{:02} {}", s, e)),
            },
            (Some(s), None) => Some(format!("S{:02}", s)),
            (None, Some(e)) => Some(e.to_string()),
            (None, None) => None,
        };
        self.request(&base, &[episode])
    }

    fn music_search(&self, criteria: &MusicSearch) -> RequestChain {
        let mut base = criteria.base.clone();
        if base.categories.is_empty() {
            base.categories = vec![StandardCategory::AUDIO];
        }
        let parts = [criteria.artist.clone(), criteria.album.clone()];
        self.request(&base, &parts)
    }

    fn book_search(&self, criteria: &BookSearch) -> RequestChain {
        let mut base = criteria.base.clone();
        if base.categories.is_empty() {
            base.categories = vec![StandardCategory::BOOKS];
        }
        let parts = [criteria.author.clone(), criteria.title.clone()];
        self.request(&base, &parts)
    }
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JackettResponse {
    Results: Vec<JackettResult>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JackettResult {
    Title: String,
    Guid: Option<String>,
    MagnetUri: Option<String>,
    Link: Option<String>,
    InfoHash: Option<String>,
    Details: Option<String>,
    Size: Option<Value>,
    Seeders: Option<Value>,
    Peers: Option<Value>,
    Grabs: Option<Value>,
    Files: Option<Value>,
    #[serde(default)]
    Category: Vec<u32>,
    CategoryDesc: Option<String>,
    PublishDate: String,
    DownloadVolumeFactor: Option<Value>,
}

fn optional_u32(value: &Option<Value>, field: &str) -> Result<Option<u32>, IndexerError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => loose_u32(v, field).map(Some),
    }
}

pub struct JackettParser {
    indexer_id: IndexerId,
    indexer_name: String,
    categories: CategoryMap,
}

impl JackettParser {
    /// Ids in the category table map through it; other standard-range ids pass through.
    fn categories_for(&self, raw: &JackettResult) -> Vec<StandardCategory> {
        let mut standard = BTreeSet::new();
        for id in &raw.Category {
            let native = id.to_string();
            let mut mapped = self
                .categories
                .mappings()
                .iter()
                .filter(|m| m.native == native)
                .map(|m| m.standard)
                .peekable();
            if mapped.peek().is_some() {
                standard.extend(mapped);
            } else if *id < CUSTOM_CATEGORY_BASE {
                standard.insert(StandardCategory(*id));
            }
        }
        if !standard.is_empty() {
            return standard.into_iter().collect();
        }
        self.categories
            .map_native_to_standard(raw.CategoryDesc.as_deref().unwrap_or_default())
    }

    fn convert(&self, raw: JackettResult) -> Result<CanonicalResult, IndexerError> {
        let seeders = optional_u32(&raw.Seeders, "Seeders")?;
        let peers = optional_u32(&raw.Peers, "Peers")?;
        let size_bytes = match &raw.Size {
            None | Some(Value::Null) => 0,
            Some(v) => loose_u64(v, "Size")?,
        };
        let freeleech = match &raw.DownloadVolumeFactor {
            None | Some(Value::Null) => false,
            Some(Value::Number(n)) => n.as_f64() == Some(0.0),
            Some(v) => !loose_bool(v, "DownloadVolumeFactor")?,
        };
        let publish_date = parse_timestamp(&raw.PublishDate, "PublishDate")?;
        let categories = self.categories_for(&raw);

        let guid = match raw.Guid.as_deref().filter(|g| !g.is_empty()) {
            Some(g) => g.to_string(),
            None => {
                let native = raw
                    .Details
                    .as_deref()
                    .or(raw.Link.as_deref())
                    .unwrap_or(raw.Title.as_str());
                CanonicalResult::derive_guid(self.indexer_id, native)
            }
        };

        Ok(CanonicalResult {
            guid,
            indexer_id: self.indexer_id,
            indexer: self.indexer_name.clone(),
            title: raw.Title,
            download_url: raw.Link,
            magnet_uri: raw.MagnetUri,
            info_url: raw.Details,
            info_hash: raw.InfoHash.map(|h| h.to_lowercase()),
            size_bytes,
            seeders,
            peers,
            grabs: optional_u32(&raw.Grabs, "Grabs")?,
            files: optional_u32(&raw.Files, "Files")?,
            publish_date,
            categories,
            freeleech,
        })
    }
}

impl ResponseParser for JackettParser {
    fn parse(&self, envelope: &ResponseEnvelope) -> Result<Vec<CanonicalResult>, IndexerError> {
        check_envelope(envelope, CONTENT_TYPE)?;

        let response: JackettResponse = serde_json::from_str(&envelope.body)
            .map_err(|e| IndexerError::invalid_payload(format!("Failed to parse response: {}", e)))?;

        let mut results = response
            .Results
            .into_iter()
            .map(|r| self.convert(r))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            indexer = %self.indexer_name,
            results = results.len(),
            "Parsed Jackett response"
        );

        sort_by_publish_date(&mut results);
        Ok(results)
    }
}
