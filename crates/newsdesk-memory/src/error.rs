//! Error types for the newsdesk memory core

use std::time::Duration;

use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::fetch::FetchError;
use crate::fingerprint::Fingerprint;

/// Main error type for memory operations
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The source reference could not be fingerprinted (caller error, not retried)
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// Malformed request arguments, such as a zero budget
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The content fetcher failed; retry policy belongs to the fetcher
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Admitting the request would overrun the session budget
    #[error("Budget exceeded: requested {requested}, available {available}")]
    BudgetExceeded { requested: usize, available: usize },

    /// The semantic compression stage did not answer in time
    #[error("Compression timed out after {0:?}")]
    CompressionTimeout(Duration),

    /// A stored item is unusable (bad embedding, inconsistent record)
    #[error("Index corruption for {fingerprint}: {reason}")]
    IndexCorruption {
        fingerprint: Fingerprint,
        reason: String,
    },

    /// Embedding generation errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Summarization provider errors
    #[error("Summarization error: {0}")]
    Summarization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Snapshot storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MemoryError {
    /// Human-readable failure reason for callers of `ingest`.
    ///
    /// The prefix tells caller mistakes apart from unreachable sources,
    /// over-budget requests and internal index failures.
    pub fn reason(&self) -> String {
        match self {
            MemoryError::InvalidSource(msg) => format!("invalid source: {msg}"),
            MemoryError::InvalidRequest(msg) => format!("invalid request: {msg}"),
            MemoryError::Fetch(e) => format!("source unreachable: {e}"),
            MemoryError::BudgetExceeded {
                requested,
                available,
            } => format!("over budget: requested {requested}, {available} available"),
            other => format!("internal index error: {other}"),
        }
    }

    /// Whether the caller can reasonably retry with different arguments
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MemoryError::BudgetExceeded { .. } | MemoryError::CompressionTimeout(_)
        )
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        MemoryError::Serialization(e.to_string())
    }
}

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;
