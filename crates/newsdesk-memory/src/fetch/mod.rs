//! Content fetching collaborator
//!
//! The core treats fetching as all-or-nothing: retries and backoff live in
//! the fetcher implementation, never in the memory manager.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::fingerprint::SourceRef;

pub use http::HttpFetcher;

/// Errors raised while fetching raw content
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Source unreachable: {0}")]
    Unreachable(String),
    #[error("Upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Response exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("Source type not fetchable: {0}")]
    Unsupported(String),
    #[error("Source returned no content")]
    Empty,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for raw content fetchers (HTTP, files, test fixtures)
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch the raw text behind a source reference
    async fn fetch(&self, source: &SourceRef) -> Result<String, FetchError>;

    /// Fetcher name for logging
    fn name(&self) -> &'static str;
}
