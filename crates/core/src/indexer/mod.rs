//! Indexer contract and the built-in implementations.
//!
//! Every indexer is a pair of a [`RequestGenerator`] and a [`ResponseParser`]
//! producing [`CanonicalResult`]s, registered with its [`Capabilities`].

mod categories;
pub mod definitions;
mod error;
mod merge;
pub mod parse;
mod registry;
mod session;
mod traits;
mod types;

pub use categories::{CategoryMap, CategoryMapping, StandardCategory, DEFAULT_PLACEHOLDER_LABELS};
pub use definitions::{build_indexer, build_indexer_with_session};
pub use error::{IndexerError, ProtocolError};
pub use merge::merge_by_publish_date;
pub use registry::IndexerRegistry;
pub use session::{CookieCallback, SessionCookies};
pub use traits::{
    Capabilities, HttpIndexer, Indexer, Page, PageFeedback, RequestChain, RequestGenerator,
    ResponseParser,
};
pub use types::{
    sanitize_term, BasicSearch, BookSearch, CanonicalResult, HttpMethod, IndexerId,
    IndexerImplementation, IndexerRequest, MovieSearch, MusicSearch, Privacy, ProviderDefinition,
    ResponseEnvelope, SearchBase, SearchCriteria, SearchType, SyncLevel, TvSearch,
};
