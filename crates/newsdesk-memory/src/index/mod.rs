//! Vector index over stored content items
//!
//! `VectorIndex` is the storage seam: the memory manager only talks to the
//! trait, `InMemoryIndex` is the bundled implementation, and
//! `IndexSnapshot` persists it between process runs.

pub mod memory;
pub mod snapshot;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::memory::types::ContentItem;

pub use memory::InMemoryIndex;
pub use snapshot::IndexSnapshot;

/// Similarity search request
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub embedding: Vec<f32>,
    pub k: usize,
    /// Lowest similarity (0-1) a hit may have
    pub min_similarity: f32,
    /// Only consider items from this host or its subdomains
    pub host: Option<String>,
}

impl RetrievalQuery {
    pub fn new(embedding: Vec<f32>, k: usize) -> Self {
        Self {
            embedding,
            k,
            min_similarity: 0.0,
            host: None,
        }
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

/// A query hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub item: ContentItem,
    /// Cosine similarity mapped to 0-1
    pub similarity: f32,
}

/// Query hits plus the fingerprints of items that could not be scored
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    pub hits: Vec<ScoredItem>,
    pub corrupted: Vec<Fingerprint>,
}

/// Aggregate view of the index contents
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_items: usize,
    pub capacity: usize,
    pub total_chars: usize,
    pub by_level: BTreeMap<String, usize>,
    pub by_host: BTreeMap<String, usize>,
    pub newest: Option<DateTime<Utc>>,
    pub oldest: Option<DateTime<Utc>>,
}

/// Storage capability for content items.
///
/// Implementations serve concurrent reads and serialize writes.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace by fingerprint, then evict down to capacity.
    /// Returns the evicted fingerprints.
    async fn upsert(&self, item: ContentItem) -> Result<Vec<Fingerprint>>;

    /// Top `k` items by similarity. Never mutates the index.
    async fn query(&self, query: &RetrievalQuery) -> Result<QueryOutcome>;

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ContentItem>>;

    /// Look an item up by its `cnt_<host>_<hex>` content id. Ids that
    /// collide resolve to the lowest fingerprint.
    async fn get_by_content_id(&self, content_id: &str) -> Result<Option<ContentItem>>;

    /// Record an access and return the updated item. Successive touches get
    /// strictly increasing access times.
    async fn touch(&self, fingerprint: &Fingerprint) -> Result<Option<ContentItem>>;

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<Option<ContentItem>>;

    /// Remove least recently used items until the index fits its capacity
    async fn evict_if_over_capacity(&self) -> Result<Vec<Fingerprint>>;

    /// Remove items created before `cutoff`
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Fingerprint>>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All items, ordered by fingerprint
    async fn items(&self) -> Result<Vec<ContentItem>>;

    async fn stats(&self) -> Result<IndexStats>;

    fn capacity(&self) -> usize;

    /// Dimension every stored embedding must have
    fn dimension(&self) -> usize;
}

/// Cosine similarity mapped from [-1, 1] to [0, 1].
///
/// Returns `None` for mismatched lengths, empty or zero vectors and
/// non-finite results.
pub fn similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !cosine.is_finite() {
        return None;
    }
    Some(((cosine.clamp(-1.0, 1.0) + 1.0) / 2.0).clamp(0.0, 1.0))
}
