//! Built-in indexer implementations.

pub mod gazelle;
pub mod jackett;

use std::sync::Arc;

use super::{Indexer, IndexerImplementation, ProviderDefinition, SessionCookies};

pub use gazelle::{GazelleIndexer, GazelleParser, GazelleRequestGenerator};
pub use jackett::{JackettIndexer, JackettParser, JackettRequestGenerator};

/// Build the indexer a definition names.
pub fn build_indexer(definition: ProviderDefinition) -> Arc<dyn Indexer> {
    build_indexer_with_session(definition, Arc::new(SessionCookies::new()))
}

/// Build an indexer sharing a caller-owned cookie session.
pub fn build_indexer_with_session(
    definition: ProviderDefinition,
    session: Arc<SessionCookies>,
) -> Arc<dyn Indexer> {
    match definition.implementation {
        IndexerImplementation::Gazelle => Arc::new(gazelle::build(definition, session)),
        IndexerImplementation::Jackett => Arc::new(jackett::build(definition)),
    }
}
