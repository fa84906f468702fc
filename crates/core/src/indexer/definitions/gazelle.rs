//! Gazelle tracker implementation (ajax.php JSON API).
//!
//! Browse responses mix two record shapes: music groups carrying a
//! `torrents` array with one entry per format variant, and flat records for
//! every other category.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::indexer::parse::{
    check_envelope, loose_bool, loose_u32, loose_u64, parse_timestamp, sort_by_publish_date,
};
use crate::indexer::{
    BasicSearch, BookSearch, CanonicalResult, Capabilities, CategoryMap, CategoryMapping,
    HttpIndexer, IndexerError, IndexerId, IndexerRequest, MusicSearch, Page, ProtocolError,
    ProviderDefinition, RequestChain, RequestGenerator, ResponseEnvelope, ResponseParser,
    SearchBase, SearchType, SessionCookies, StandardCategory,
};

const CONTENT_TYPE: &str = "application/json";

/// Pages fetched per search at most, whatever the tracker reports.
const MAX_PAGES: usize = 5;

pub type GazelleIndexer = HttpIndexer<GazelleRequestGenerator, GazelleParser>;

/// Built-in category table for Gazelle music trackers.
pub fn default_categories() -> Vec<CategoryMapping> {
    vec![
        CategoryMapping::labelled("1", StandardCategory::AUDIO, "Music"),
        CategoryMapping::labelled("2", StandardCategory::PC, "Applications"),
        CategoryMapping::labelled("3", StandardCategory::BOOKS_EBOOK, "E-Books"),
        CategoryMapping::labelled("4", StandardCategory::AUDIO_AUDIOBOOK, "Audiobooks"),
        CategoryMapping::labelled("5", StandardCategory::OTHER, "E-Learning Videos"),
        CategoryMapping::labelled("6", StandardCategory::OTHER, "Comedy"),
        CategoryMapping::labelled("7", StandardCategory::BOOKS_COMICS, "Comics"),
    ]
}

/// Assemble a Gazelle indexer from its definition.
pub fn build(definition: ProviderDefinition, session: Arc<SessionCookies>) -> GazelleIndexer {
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
        search_types: vec![SearchType::Search, SearchType::Music, SearchType::Book],
        categories: categories.clone(),
    };
    let generator = GazelleRequestGenerator {
        base_url: definition.base_url().to_string(),
        api_key: definition.api_key.clone(),
        categories: categories.clone(),
        session,
    };
    let parser = GazelleParser {
        indexer_id: definition.id,
        indexer_name: definition.name.clone(),
        base_url: definition.base_url().to_string(),
        categories,
    };
    HttpIndexer::new(definition, capabilities, generator, parser)
}

#[derive(Clone)]
pub struct GazelleRequestGenerator {
    base_url: String,
    api_key: Option<String>,
    categories: CategoryMap,
    session: Arc<SessionCookies>,
}

impl GazelleRequestGenerator {
    fn browse_url(&self, params: &[(&str, String)], native_category: Option<&str>, page: usize) -> String {
        let mut url = format!("{}/ajax.php?action=browse", self.base_url);
        for (name, value) in params {
            if !value.is_empty() {
                url.push_str(&format!("&{}={}", name, urlencoding::encode(value)));
            }
        }
        if let Some(native) = native_category {
            url.push_str(&format!("&filter_cat[{}]=1", urlencoding::encode(native)));
        }
        if page > 1 {
            url.push_str(&format!("&page={}", page));
        }
        url
    }

    fn authorize(&self, request: IndexerRequest) -> IndexerRequest {
        let request = match &self.api_key {
            Some(key) => request.with_header("Authorization", key.clone()),
            None => request,
        };
        match self.session.header_value(Utc::now()) {
            Some(cookie) => request.with_header("Cookie", cookie),
            None => request,
        }
    }

    /// One request per mapped native category (or one unfiltered request).
    fn page(&self, base: &SearchBase, params: &[(&str, String)], page: usize) -> Page {
        let mut natives: Vec<String> = Vec::new();
        for category in &base.categories {
            for native in self.categories.map_standard_to_native(*category) {
                if !natives.contains(&native) {
                    natives.push(native);
                }
            }
        }

        if natives.is_empty() {
            return vec![self.authorize(IndexerRequest::get(self.browse_url(params, None, page)))];
        }
        natives
            .iter()
            .map(|native| {
                self.authorize(IndexerRequest::get(self.browse_url(
                    params,
                    Some(native),
                    page,
                )))
            })
            .collect()
    }

    fn chain(&self, base: &SearchBase, params: Vec<(&'static str, String)>) -> RequestChain {
        // A category filter that maps to nothing on this tracker cannot match.
        if !base.categories.is_empty()
            && base
                .categories
                .iter()
                .all(|c| self.categories.map_standard_to_native(*c).is_empty())
        {
            return RequestChain::empty();
        }

        let first = self.page(base, &params, 1);
        // Later pages are built on demand so they carry the current session cookies.
        let generator = self.clone();
        let base = base.clone();

        RequestChain::from_pages(vec![first]).then(move |feedback| {
            let total = feedback.total_pages? as usize;
            let number = feedback.page_index + 2;
            if number > total.min(MAX_PAGES) || feedback.results == 0 {
                return None;
            }
            Some(generator.page(&base, &params, number))
        })
    }
}

impl RequestGenerator for GazelleRequestGenerator {
    fn basic_search(&self, criteria: &BasicSearch) -> RequestChain {
        let params = vec![("searchstr", criteria.base.term.clone())];
        self.chain(&criteria.base, params)
    }

    fn music_search(&self, criteria: &MusicSearch) -> RequestChain {
        let params = vec![
            ("searchstr", criteria.base.term.clone()),
            ("artistname", criteria.artist.clone().unwrap_or_default()),
            ("groupname", criteria.album.clone().unwrap_or_default()),
            ("recordlabel", criteria.label.clone().unwrap_or_default()),
            (
                "year",
                criteria.year.map(|y| y.to_string()).unwrap_or_default(),
            ),
        ];
        self.chain(&criteria.base, params)
    }

    fn book_search(&self, criteria: &BookSearch) -> RequestChain {
        let term = [
            criteria.author.as_deref().unwrap_or_default(),
            criteria.title.as_deref().unwrap_or_default(),
            criteria.base.term.as_str(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");

        let mut base = criteria.base.clone();
        if base.categories.is_empty() {
            base.categories = vec![StandardCategory::BOOKS, StandardCategory::AUDIO_AUDIOBOOK];
        }
        self.chain(&base, vec![("searchstr", term)])
    }

    fn cookies(&self) -> HashMap<String, String> {
        self.session.current(Utc::now())
    }

    fn update_cookies(&self, cookies: HashMap<String, String>, expiry: Option<DateTime<Utc>>) {
        self.session.update(cookies, expiry);
    }
}

pub struct GazelleParser {
    indexer_id: IndexerId,
    indexer_name: String,
    base_url: String,
    categories: CategoryMap,
}

fn required<'a>(record: &'a Map<String, Value>, field: &str) -> Result<&'a Value, IndexerError> {
    record
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| IndexerError::invalid_payload(format!("missing required field {}", field)))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn optional_u32(record: &Map<String, Value>, field: &str) -> Result<Option<u32>, IndexerError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => loose_u32(value, field).map(Some),
    }
}

fn is_no_results(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("no results") || message.contains("no torrents found")
}

impl GazelleParser {
    fn torrent_result(
        &self,
        torrent: &Map<String, Value>,
        title: String,
        group_id: Option<&Value>,
        time_field: &str,
        categories: Vec<StandardCategory>,
    ) -> Result<CanonicalResult, IndexerError> {
        let torrent_id = text(required(torrent, "torrentId")?);
        let seeders = loose_u32(required(torrent, "seeders")?, "seeders")?;
        let leechers = loose_u32(required(torrent, "leechers")?, "leechers")?;
        let publish_date = parse_timestamp(&text(required(torrent, time_field)?), time_field)?;
        let freeleech = match torrent.get("isFreeleech") {
            None | Some(Value::Null) => false,
            Some(value) => loose_bool(value, "isFreeleech")?,
        };

        let info_url = match group_id {
            Some(group) => format!(
                "{}/torrents.php?id={}&torrentid={}",
                self.base_url,
                text(group),
                torrent_id
            ),
            None => format!("{}/torrents.php?torrentid={}", self.base_url, torrent_id),
        };

        Ok(CanonicalResult {
            guid: CanonicalResult::derive_guid(self.indexer_id, &torrent_id),
            indexer_id: self.indexer_id,
            indexer: self.indexer_name.clone(),
            title,
            download_url: Some(format!(
                "{}/ajax.php?action=download&id={}",
                self.base_url, torrent_id
            )),
            magnet_uri: None,
            info_url: Some(info_url),
            info_hash: None,
            size_bytes: loose_u64(required(torrent, "size")?, "size")?,
            seeders: Some(seeders),
            peers: Some(seeders.saturating_add(leechers)),
            grabs: optional_u32(torrent, "snatches")?,
            files: optional_u32(torrent, "fileCount")?,
            publish_date,
            categories,
            freeleech,
        })
    }

    /// Music group: one result per format variant.
    fn parse_group(
        &self,
        group: &Map<String, Value>,
        torrents: &[Value],
        out: &mut Vec<CanonicalResult>,
    ) -> Result<(), IndexerError> {
        let group_name = text(required(group, "groupName")?);
        let artist = group.get("artist").map(text).unwrap_or_default();
        let year = group.get("groupYear").map(text).filter(|y| y != "0");
        let release_type = group.get("releaseType").map(text);
        let categories = self.categories.map_native_to_standard("Music");

        for torrent in torrents {
            let torrent = torrent
                .as_object()
                .ok_or_else(|| IndexerError::invalid_payload("torrent entry is not an object"))?;

            let mut title = if artist.is_empty() {
                group_name.clone()
            } else {
                format!("{} - {}", artist, group_name)
            };
            if let Some(year) = &year {
                title.push_str(&format!(" [{}]", year));
            }
            if let Some(release_type) = &release_type {
                title.push_str(&format!(" [{}]", release_type));
            }
            let variant: Vec<String> = ["format", "encoding", "media"]
                .iter()
                .filter_map(|f| torrent.get(*f).map(text))
                .filter(|s| !s.is_empty())
                .collect();
            if !variant.is_empty() {
                title.push_str(&format!(" [{}]", variant.join(" ")));
            }

            out.push(self.torrent_result(
                torrent,
                title,
                group.get("groupId"),
                "time",
                categories.clone(),
            )?);
        }
        Ok(())
    }

    /// Non-music record: exactly one result.
    fn parse_flat(&self, record: &Map<String, Value>) -> Result<CanonicalResult, IndexerError> {
        let title = text(required(record, "groupName")?);
        let categories = match record.get("category") {
            Some(category) => self.categories.map_native_to_standard(&text(category)),
            None => vec![self.categories.fallback()],
        };
        self.torrent_result(record, title, record.get("groupId"), "groupTime", categories)
    }
}

impl ResponseParser for GazelleParser {
    fn parse(&self, envelope: &ResponseEnvelope) -> Result<Vec<CanonicalResult>, IndexerError> {
        check_envelope(envelope, CONTENT_TYPE)?;

        let payload: Value = serde_json::from_str(&envelope.body)
            .map_err(|e| IndexerError::invalid_payload(format!("invalid JSON: {}", e)))?;

        let status = payload.get("status").and_then(Value::as_str).unwrap_or_default();
        if status != "success" {
            let message = payload
                .get("error")
                .map(text)
                .unwrap_or_else(|| format!("status {:?}", status));
            if is_no_results(&message) {
                return Ok(Vec::new());
            }
            return Err(ProtocolError::IndexerReported(message).into());
        }

        let records = payload
            .get("response")
            .and_then(|r| r.get("results"))
            .and_then(Value::as_array)
            .ok_or_else(|| IndexerError::invalid_payload("missing response.results"))?;

        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let record = record
                .as_object()
                .ok_or_else(|| IndexerError::invalid_payload("result is not an object"))?;
            match record.get("torrents").and_then(Value::as_array) {
                Some(torrents) => self.parse_group(record, torrents, &mut results)?,
                None => results.push(self.parse_flat(record)?),
            }
        }

        debug!(
            indexer = %self.indexer_name,
            records = records.len(),
            results = results.len(),
            "Parsed Gazelle response"
        );

        sort_by_publish_date(&mut results);
        Ok(results)
    }

    fn total_pages(&self, envelope: &ResponseEnvelope) -> Option<u32> {
        let payload: Value = serde_json::from_str(&envelope.body).ok()?;
        let pages = payload.get("response")?.get("pages")?;
        loose_u32(pages, "pages").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{Indexer, PageFeedback, Privacy, SearchCriteria, SyncLevel};
    use crate::indexer::IndexerImplementation;
    use serde_json::json;

    fn definition() -> ProviderDefinition {
        ProviderDefinition {
            id: 3,
            name: "Orpheus".to_string(),
            implementation: IndexerImplementation::Gazelle,
            base_urls: vec!["https://orpheus.example/".to_string()],
            api_key: Some("secret".to_string()),
            enabled: true,
            privacy: Privacy::Private,
            sync_level: SyncLevel::FullSync,
            categories: vec![],
            fallback_category: None,
            search_types: None,
        }
    }

    fn indexer() -> GazelleIndexer {
        build(definition(), Arc::new(SessionCookies::new()))
    }

    fn envelope(body: Value) -> ResponseEnvelope {
        ResponseEnvelope::new(IndexerRequest::get("https://orpheus.example/ajax.php"), 200, body.to_string())
            .with_header("Content-Type", "application/json")
    }

    fn flat(id: u32, name: &str, time: &str, category: Option<&str>) -> Value {
        let mut record = json!({
            "torrentId": id,
            "groupId": id + 1000,
            "groupName": name,
            "fileCount": 1,
            "groupTime": time,
            "size": "1048576",
            "snatches": "2",
            "seeders": "5",
            "leechers": "3",
            "isFreeleech": false
        });
        if let Some(category) = category {
            record["category"] = json!(category);
        }
        record
    }

    fn group() -> Value {
        json!({
            "groupId": 77,
            "groupName": "Abbey Road",
            "artist": "The Beatles",
            "groupYear": 1969,
            "releaseType": "Album",
            "groupTime": "1339117820",
            "torrents": [
                {"torrentId": 1, "format": "FLAC", "encoding": "Lossless", "media": "CD",
                 "fileCount": 17, "time": "2012-06-07 12:35:37", "size": 300000000,
                 "snatches": 40, "seeders": 12, "leechers": 1, "isFreeleech": true},
                {"torrentId": 2, "format": "MP3", "encoding": "320", "media": "CD",
                 "fileCount": 17, "time": "2012-06-08 09:00:00", "size": "120000000",
                 "snatches": "15", "seeders": "7", "leechers": "0", "isFreeleech": false}
            ]
        })
    }

    #[test]
    fn test_single_flat_record() {
        let body = json!({"status": "success", "response": {"results": [
            flat(10, "Some Ebook", "2020-01-01 00:00:00", Some("E-Books"))
        ]}});
        let results = indexer().parser().parse(&envelope(body)).unwrap();

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.seeders, Some(5));
        assert_eq!(r.peers, Some(8));
        assert_eq!(r.grabs, Some(2));
        assert_eq!(r.size_bytes, 1_048_576);
        assert_eq!(r.categories, vec![StandardCategory::BOOKS_EBOOK]);
        assert_eq!(r.guid, CanonicalResult::derive_guid(3, "10"));
        assert_eq!(
            r.download_url.as_deref(),
            Some("https://orpheus.example/ajax.php?action=download&id=10")
        );
    }

    #[test]
    fn test_mixed_shapes() {
        let body = json!({"status": "success", "response": {"results": [
            group(),
            flat(10, "Ebook", "2019-01-01 00:00:00", Some("E-Books")),
            flat(11, "Comic", "2018-01-01 00:00:00", Some("Comics"))
        ]}});
        let results = indexer().parser().parse(&envelope(body)).unwrap();

        // Two format variants plus two flat records.
        assert_eq!(results.len(), 4);
        let music: Vec<_> = results
            .iter()
            .filter(|r| r.categories == vec![StandardCategory::AUDIO])
            .collect();
        assert_eq!(music.len(), 2);
        assert!(music
            .iter()
            .any(|r| r.title == "The Beatles - Abbey Road [1969] [Album] [FLAC Lossless CD]"));
        assert!(music.iter().any(|r| r.freeleech));
    }

    #[test]
    fn test_sorted_by_publish_date_desc() {
        let body = json!({"status": "success", "response": {"results": [
            flat(1, "old", "2010-01-01 00:00:00", None),
            group(),
            flat(2, "new", "2022-01-01 00:00:00", None)
        ]}});
        let results = indexer().parser().parse(&envelope(body)).unwrap();
        let dates: Vec<_> = results.iter().map(|r| r.publish_date).collect();
        let mut sorted = dates.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(dates, sorted);
        assert_eq!(results[0].title, "new");
    }

    #[test]
    fn test_unknown_category_uses_fallback() {
        let body = json!({"status": "success", "response": {"results": [
            flat(1, "x", "2020-01-01 00:00:00", Some("Interpretive Dance")),
            flat(2, "y", "2020-01-01 00:00:00", Some("Select Category"))
        ]}});
        let results = indexer().parser().parse(&envelope(body)).unwrap();
        for r in &results {
            assert_eq!(r.categories, vec![StandardCategory::MOVIES]);
        }
    }

    #[test]
    fn test_malformed_count_fails_response() {
        let mut bad = flat(2, "bad", "2020-01-01 00:00:00", None);
        bad["seeders"] = json!("5ish");
        let body = json!({"status": "success", "response": {"results": [
            flat(1, "good", "2020-01-01 00:00:00", None),
            bad
        ]}});
        let err = indexer().parser().parse(&envelope(body)).unwrap_err();
        assert!(matches!(
            err,
            IndexerError::Protocol(ProtocolError::InvalidField { ref field, .. }) if field == "seeders"
        ));
    }

    #[test]
    fn test_missing_required_field_fails() {
        let mut bad = flat(1, "bad", "2020-01-01 00:00:00", None);
        bad.as_object_mut().unwrap().remove("torrentId");
        let body = json!({"status": "success", "response": {"results": [bad]}});
        assert!(indexer().parser().parse(&envelope(body)).is_err());
    }

    #[test]
    fn test_failure_status_no_results_is_empty() {
        let body = json!({"status": "failure", "error": "No results found"});
        assert!(indexer().parser().parse(&envelope(body)).unwrap().is_empty());
    }

    #[test]
    fn test_failure_status_other_is_error() {
        let body = json!({"status": "failure", "error": "bad credentials"});
        let err = indexer().parser().parse(&envelope(body)).unwrap_err();
        assert!(matches!(err, IndexerError::Protocol(ProtocolError::IndexerReported(_))));
    }

    #[test]
    fn test_total_pages() {
        let body = json!({"status": "success", "response": {"currentPage": 1, "pages": 4, "results": []}});
        assert_eq!(indexer().parser().total_pages(&envelope(body)), Some(4));
    }

    #[test]
    fn test_basic_search_request() {
        let mut chain = indexer().generator().generate(&SearchCriteria::basic("abbey road"));
        let page = chain.next_page(None).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(
            page[0].url,
            "https://orpheus.example/ajax.php?action=browse&searchstr=abbey%20road"
        );
        assert!(page[0]
            .headers
            .contains(&("Authorization".to_string(), "secret".to_string())));
    }

    #[test]
    fn test_music_search_one_request_per_category() {
        let criteria = SearchCriteria::Music(MusicSearch {
            base: SearchBase::new("").with_categories(vec![StandardCategory::AUDIO]),
            artist: Some("The Beatles".to_string()),
            album: Some("Abbey Road".to_string()),
            label: None,
            year: Some(1969),
        });
        let mut chain = indexer().generator().generate(&criteria);
        let page = chain.next_page(None).unwrap();

        // Audio maps to Music (1) and Audiobooks (4).
        assert_eq!(page.len(), 2);
        assert!(page[0].url.contains("artistname=The%20Beatles"));
        assert!(page[0].url.contains("groupname=Abbey%20Road"));
        assert!(page[0].url.contains("year=1969"));
        assert!(page[0].url.contains("filter_cat[1]=1"));
        assert!(page[1].url.contains("filter_cat[4]=1"));
    }

    #[test]
    fn test_unmappable_category_yields_empty_chain() {
        let criteria = SearchCriteria::Basic(BasicSearch {
            base: SearchBase::new("x").with_categories(vec![StandardCategory::TV]),
        });
        assert!(indexer().generator().generate(&criteria).is_empty());
    }

    #[test]
    fn test_movie_search_unsupported() {
        let idx = indexer();
        let criteria = SearchCriteria::Movie(crate::indexer::MovieSearch {
            base: SearchBase::new("x"),
            imdb_id: None,
            year: None,
        });
        assert!(!idx.supports(&criteria));
        assert!(idx.generator().generate(&criteria).is_empty());
    }

    #[test]
    fn test_pagination_follows_reported_pages() {
        let mut chain = indexer().generator().generate(&SearchCriteria::basic("x"));
        chain.next_page(None).unwrap();

        let next = chain
            .next_page(Some(&PageFeedback {
                page_index: 0,
                results: 50,
                total_pages: Some(2),
            }))
            .unwrap();
        assert!(next[0].url.ends_with("&page=2"));

        assert!(chain
            .next_page(Some(&PageFeedback {
                page_index: 1,
                results: 50,
                total_pages: Some(2),
            }))
            .is_none());
    }

    #[test]
    fn test_cookies_side_channel() {
        let idx = build(
            ProviderDefinition {
                api_key: None,
                ..definition()
            },
            Arc::new(SessionCookies::new()),
        );
        idx.generator().update_cookies(
            HashMap::from([("session".to_string(), "abc".to_string())]),
            None,
        );
        assert_eq!(idx.generator().cookies().get("session").map(String::as_str), Some("abc"));

        let mut chain = idx.generator().generate(&SearchCriteria::basic("x"));
        let page = chain.next_page(None).unwrap();
        assert!(page[0]
            .headers
            .contains(&("Cookie".to_string(), "session=abc".to_string())));
    }

    #[test]
    fn test_later_pages_use_refreshed_cookies() {
        let idx = build(
            ProviderDefinition {
                api_key: None,
                ..definition()
            },
            Arc::new(SessionCookies::new()),
        );
        idx.generator().update_cookies(
            HashMap::from([("session".to_string(), "old".to_string())]),
            None,
        );

        let mut chain = idx.generator().generate(&SearchCriteria::basic("x"));
        let first = chain.next_page(None).unwrap();
        assert!(first[0]
            .headers
            .contains(&("Cookie".to_string(), "session=old".to_string())));

        idx.generator().update_cookies(
            HashMap::from([("session".to_string(), "new".to_string())]),
            None,
        );
        let second = chain
            .next_page(Some(&PageFeedback {
                page_index: 0,
                results: 50,
                total_pages: Some(3),
            }))
            .unwrap();
        assert!(second[0].url.ends_with("&page=2"));
        assert!(second[0]
            .headers
            .contains(&("Cookie".to_string(), "session=new".to_string())));
    }
}
