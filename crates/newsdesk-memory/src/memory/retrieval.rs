//! Retrieval results and budget fitting

use serde::Serialize;

use crate::compression::CompressionLevel;
use crate::fingerprint::Fingerprint;
use crate::index::ScoredItem;
use crate::memory::types::ContentItem;

/// A retrieved item, ready to be placed into a working context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedContent {
    pub fingerprint: Fingerprint,
    /// Compact reference for agent prompts
    pub content_id: String,
    pub source_ref: String,
    pub text: String,
    pub level: CompressionLevel,
    /// Similarity to the query (0-1)
    pub similarity: f32,
    /// Characters of `text`
    pub size: usize,
    pub access_count: u32,
    pub reading_time_minutes: usize,
}

impl RetrievedContent {
    pub fn new(item: ContentItem, similarity: f32) -> Self {
        Self {
            content_id: item.content_id(),
            size: item.size(),
            reading_time_minutes: item.reading_time_minutes(),
            access_count: item.access_count,
            fingerprint: item.fingerprint,
            source_ref: item.source_ref,
            text: item.compressed_text,
            level: item.compression_level,
            similarity,
        }
    }
}

/// Drop hits from the tail of a ranked list until their combined size fits
/// in `available` characters.
pub fn fit_to_budget(mut hits: Vec<ScoredItem>, available: usize) -> Vec<ScoredItem> {
    let mut total: usize = hits.iter().map(|h| h.item.size()).sum();
    while total > available {
        match hits.pop() {
            Some(dropped) => total -= dropped.item.size(),
            None => break,
        }
    }
    hits
}
