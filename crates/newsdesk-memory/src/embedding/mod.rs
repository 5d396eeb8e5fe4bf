//! Embedding providers
//!
//! The core only needs a deterministic text -> fixed-length vector mapping.
//! `HashedEmbedder` is dependency-free and reproducible; `LocalEmbedder`
//! runs a fastembed model when the `embed-local` feature is enabled.

pub mod hashed;
#[cfg(feature = "embed-local")]
pub mod local;

use async_trait::async_trait;
use thiserror::Error;

pub use hashed::HashedEmbedder;
#[cfg(feature = "embed-local")]
pub use local::LocalEmbedder;

/// Default embedding dimension (matches e5-small)
pub const EMBEDDING_DIMENSION: usize = 384;

/// Maximum number of characters handed to the embedding model
pub const MAX_EMBEDDING_INPUT_CHARS: usize = 8000;

/// Errors raised by embedding providers
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model loading failed: {0}")]
    ModelLoadFailed(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("No embedding returned")]
    Empty,
    #[error("Expected a {expected}-dimensional embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Embedding contains non-finite values")]
    NonFinite,
}

/// Capability that turns text into a fixed-length vector.
///
/// Implementations must be deterministic for identical input so retrieval
/// results are reproducible.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Cap embedding input on a char boundary
pub(crate) fn clamp_input(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBEDDING_INPUT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Check that a vector is usable for similarity search
pub fn validate_embedding(embedding: &[f32], dimension: usize) -> Result<(), EmbeddingError> {
    if embedding.is_empty() {
        return Err(EmbeddingError::Empty);
    }
    if embedding.len() != dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: embedding.len(),
        });
    }
    if !embedding.iter().all(|v| v.is_finite()) {
        return Err(EmbeddingError::NonFinite);
    }
    Ok(())
}
