//! Outbound HTTP transport abstraction.
//!
//! Request generators only describe requests; a `Transport` executes them.
//! Transport failures are kept apart from parser failures so the status
//! tracker can weigh them differently.

mod http;

pub use http::{HttpTransport, TransportConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::indexer::{IndexerRequest, ResponseEnvelope};

/// Network-level failures.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Name resolution failed: {0}")]
    NameResolution(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Other(String),
}

/// Executes a single request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &IndexerRequest) -> Result<ResponseEnvelope, TransportError>;
}
