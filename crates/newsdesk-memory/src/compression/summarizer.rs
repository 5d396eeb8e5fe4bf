//! Summarizer provider trait for the semantic compression stage
//!
//! Defines the Summarizer trait that abstracts abstractive summarization
//! backends (remote chat-completion APIs, test doubles).

use async_trait::async_trait;
use thiserror::Error;

use super::SummaryStyle;

/// Summarizer-specific errors
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Rate limited after {0} attempts")]
    RateLimited(u32),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Summarizer returned an empty summary")]
    Empty,
}

/// Trait for abstractive summarization providers
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `text` in the requested style.
    ///
    /// The result is re-checked against the budget by the compressor, so
    /// providers do not need to enforce length themselves.
    async fn summarize(&self, text: &str, style: SummaryStyle) -> Result<String, SummarizeError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
