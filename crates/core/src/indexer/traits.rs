//! Capability contract every indexer implements.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fmt;

use super::categories::CategoryMap;
use super::error::IndexerError;
use super::types::{
    BasicSearch, BookSearch, CanonicalResult, IndexerRequest, MovieSearch, MusicSearch,
    ProviderDefinition, ResponseEnvelope, SearchCriteria, SearchType, TvSearch,
};

/// Requests issued together for one logical page.
pub type Page = Vec<IndexerRequest>;

/// What the orchestrator learned from the last processed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFeedback {
    /// Zero-based index of the page just processed.
    pub page_index: usize,
    /// Results parsed from that page.
    pub results: usize,
    /// Total pages reported by the indexer, if it reports one.
    pub total_pages: Option<u32>,
}

type Continuation = Box<dyn FnMut(&PageFeedback) -> Option<Page> + Send>;

/// Ordered chain of pages, materialized as the orchestrator consumes them.
///
/// Queued pages are handed out first. Once they are exhausted the optional
/// continuation is asked for further pages, given feedback about the page
/// just processed, until it returns `None`.
#[derive(Default)]
pub struct RequestChain {
    pages: VecDeque<Page>,
    continuation: Option<Continuation>,
}

impl fmt::Debug for RequestChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestChain")
            .field("pages", &self.pages)
            .field("continuation", &self.continuation.is_some())
            .finish()
    }
}

impl RequestChain {
    /// A chain that issues nothing: the criteria type is not supported.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(request: IndexerRequest) -> Self {
        Self::from_pages(vec![vec![request]])
    }

    pub fn from_pages(pages: Vec<Page>) -> Self {
        Self {
            pages: pages.into_iter().filter(|p| !p.is_empty()).collect(),
            continuation: None,
        }
    }

    pub fn push_page(&mut self, page: Page) {
        if !page.is_empty() {
            self.pages.push_back(page);
        }
    }

    /// Attach a lazy continuation producing pages after the queued ones.
    pub fn then<F>(mut self, continuation: F) -> Self
    where
        F: FnMut(&PageFeedback) -> Option<Page> + Send + 'static,
    {
        self.continuation = Some(Box::new(continuation));
        self
    }

    /// True when the chain can never produce a request.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Next page to issue, or `None` when the chain is done.
    pub fn next_page(&mut self, last: Option<&PageFeedback>) -> Option<Page> {
        if let Some(page) = self.pages.pop_front() {
            return Some(page);
        }
        let feedback = last?;
        let continuation = self.continuation.as_mut()?;
        match continuation(feedback) {
            Some(page) if !page.is_empty() => Some(page),
            _ => {
                self.continuation = None;
                None
            }
        }
    }
}

/// Turns search criteria into indexer-specific HTTP requests.
///
/// Variants an indexer does not support return an empty chain.
pub trait RequestGenerator: Send + Sync {
    fn basic_search(&self, _criteria: &BasicSearch) -> RequestChain {
        RequestChain::empty()
    }

    fn movie_search(&self, _criteria: &MovieSearch) -> RequestChain {
        RequestChain::empty()
    }

    fn tv_search(&self, _criteria: &TvSearch) -> RequestChain {
        RequestChain::empty()
    }

    fn music_search(&self, _criteria: &MusicSearch) -> RequestChain {
        RequestChain::empty()
    }

    fn book_search(&self, _criteria: &BookSearch) -> RequestChain {
        RequestChain::empty()
    }

    fn generate(&self, criteria: &SearchCriteria) -> RequestChain {
        match criteria {
            SearchCriteria::Basic(c) => self.basic_search(c),
            SearchCriteria::Movie(c) => self.movie_search(c),
            SearchCriteria::Tv(c) => self.tv_search(c),
            SearchCriteria::Music(c) => self.music_search(c),
            SearchCriteria::Book(c) => self.book_search(c),
        }
    }

    /// Session cookies currently attached to requests.
    fn cookies(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Replace session cookies, e.g. after an out-of-band login.
    fn update_cookies(&self, _cookies: HashMap<String, String>, _expiry: Option<DateTime<Utc>>) {}
}

/// Turns a raw reply into canonical results.
pub trait ResponseParser: Send + Sync {
    /// Parse one response. Results come back sorted by descending publish date.
    fn parse(&self, envelope: &ResponseEnvelope) -> Result<Vec<CanonicalResult>, IndexerError>;

    /// Total pages reported by the response, for lazy pagination.
    fn total_pages(&self, _envelope: &ResponseEnvelope) -> Option<u32> {
        None
    }
}

/// Declared search types and category table of an indexer.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub search_types: Vec<SearchType>,
    pub categories: CategoryMap,
}

impl Capabilities {
    pub fn supports(&self, search_type: SearchType) -> bool {
        self.search_types.contains(&search_type)
    }
}

/// Fixed capability set registered per indexer.
pub trait Indexer: Send + Sync {
    fn definition(&self) -> &ProviderDefinition;
    fn capabilities(&self) -> &Capabilities;
    fn generator(&self) -> &dyn RequestGenerator;
    fn parser(&self) -> &dyn ResponseParser;

    fn id(&self) -> super::IndexerId {
        self.definition().id
    }

    fn name(&self) -> &str {
        &self.definition().name
    }

    fn supports(&self, criteria: &SearchCriteria) -> bool {
        self.capabilities().supports(criteria.search_type())
    }
}

/// An indexer assembled from a generator and a parser.
pub struct HttpIndexer<G, P> {
    definition: ProviderDefinition,
    capabilities: Capabilities,
    generator: G,
    parser: P,
}

impl<G, P> HttpIndexer<G, P>
where
    G: RequestGenerator,
    P: ResponseParser,
{
    /// Definition's `search_types`, when set, narrows the implementation's.
    pub fn new(
        definition: ProviderDefinition,
        mut capabilities: Capabilities,
        generator: G,
        parser: P,
    ) -> Self {
        if let Some(allowed) = &definition.search_types {
            capabilities.search_types.retain(|t| allowed.contains(t));
        }
        Self {
            definition,
            capabilities,
            generator,
            parser,
        }
    }
}

impl<G, P> Indexer for HttpIndexer<G, P>
where
    G: RequestGenerator,
    P: ResponseParser,
{
    fn definition(&self) -> &ProviderDefinition {
        &self.definition
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn generator(&self) -> &dyn RequestGenerator {
        &self.generator
    }

    fn parser(&self) -> &dyn ResponseParser {
        &self.parser
    }
}
