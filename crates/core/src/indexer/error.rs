//! Error taxonomy for indexer pipelines.

use std::time::Duration;
use thiserror::Error;

use crate::status::{Classify, FailureClass};
use crate::transport::TransportError;

/// Reply was reachable but not acceptable.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unexpected HTTP status {status}: {excerpt}")]
    UnexpectedStatus { status: u16, excerpt: String },

    #[error("Unexpected content type {actual:?}, expected {expected}")]
    UnexpectedContentType {
        expected: String,
        actual: Option<String>,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid value {value:?} for field {field}: {reason}")]
    InvalidField {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Indexer reported an error: {0}")]
    IndexerReported(String),
}

/// Errors raised by a single indexer's request/parse pipeline.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Rate limited by indexer (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Search deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Unclassified indexer error: {0}")]
    Unclassified(String),
}

impl IndexerError {
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::InvalidPayload(message.into()))
    }

    pub fn invalid_field(field: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        })
    }

    /// Short kind label for diagnostics and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::RateLimited { .. } => "rate_limited",
            Self::Protocol(_) => "protocol",
            Self::DeadlineExceeded(_) => "deadline",
            Self::Unclassified(_) => "unclassified",
        }
    }
}

impl Classify for IndexerError {
    fn failure_class(&self) -> FailureClass {
        match self {
            Self::Transport(TransportError::Other(_)) => FailureClass::Unclassified,
            Self::Transport(_) => FailureClass::Connection,
            Self::RateLimited { retry_after } => FailureClass::RateLimited {
                retry_after: *retry_after,
            },
            Self::Protocol(_) | Self::DeadlineExceeded(_) => FailureClass::Generic,
            Self::Unclassified(_) => FailureClass::Unclassified,
        }
    }
}
