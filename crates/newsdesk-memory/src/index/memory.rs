//! In-memory vector index with LRU eviction

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    IndexSnapshot, IndexStats, QueryOutcome, RetrievalQuery, ScoredItem, VectorIndex, similarity,
};
use crate::embedding::validate_embedding;
use crate::error::{MemoryError, Result};
use crate::fingerprint::Fingerprint;
use crate::memory::types::ContentItem;

/// Eviction order: oldest access first, then fewest accesses, then fingerprint
type LruKey = (DateTime<Utc>, u32, Fingerprint);

fn lru_key(item: &ContentItem) -> LruKey {
    (
        item.last_accessed_at,
        item.access_count,
        item.fingerprint.clone(),
    )
}

#[derive(Debug, Default)]
struct IndexState {
    items: HashMap<Fingerprint, ContentItem>,
    lru: BTreeSet<LruKey>,
    /// Last access time handed out by `touch`
    clock: Option<DateTime<Utc>>,
}

impl IndexState {
    fn next_access_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.clock {
            Some(last) if now <= last => last + Duration::nanoseconds(1),
            _ => now,
        };
        self.clock = Some(at);
        at
    }

    fn insert(&mut self, item: ContentItem) {
        if let Some(previous) = self.items.remove(&item.fingerprint) {
            self.lru.remove(&lru_key(&previous));
        }
        self.lru.insert(lru_key(&item));
        self.items.insert(item.fingerprint.clone(), item);
    }

    fn remove(&mut self, fingerprint: &Fingerprint) -> Option<ContentItem> {
        let item = self.items.remove(fingerprint)?;
        self.lru.remove(&lru_key(&item));
        Some(item)
    }

    fn evict_to(&mut self, capacity: usize) -> Vec<Fingerprint> {
        let mut evicted = Vec::new();
        while self.items.len() > capacity {
            let Some((_, _, fingerprint)) = self.lru.pop_first() else {
                break;
            };
            self.items.remove(&fingerprint);
            evicted.push(fingerprint);
        }
        evicted
    }
}

/// Vector index held entirely in memory.
///
/// Queries take a shared read lock and run concurrently; writes are
/// serialized behind the write lock. Similarity search is a linear scan,
/// which is fine for the few hundred items a newsdesk keeps.
#[derive(Debug)]
pub struct InMemoryIndex {
    state: RwLock<IndexState>,
    capacity: usize,
    dimension: usize,
}

impl InMemoryIndex {
    pub fn new(capacity: usize, dimension: usize) -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            capacity: capacity.max(1),
            dimension,
        }
    }

    /// Rebuild an index from a snapshot, evicting down to `capacity`
    pub fn from_snapshot(snapshot: IndexSnapshot, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut state = IndexState::default();
        for (_, item) in snapshot.items {
            state.insert(item);
        }
        let evicted = state.evict_to(capacity);
        if !evicted.is_empty() {
            info!(
                "Evicted {} items while loading snapshot over capacity {}",
                evicted.len(),
                capacity
            );
        }

        Self {
            state: RwLock::new(state),
            capacity,
            dimension: snapshot.dimension,
        }
    }

    /// Copy of the current contents
    pub async fn snapshot(&self) -> IndexSnapshot {
        let state = self.state.read().await;
        IndexSnapshot::new(self.dimension, state.items.values().cloned())
    }

    fn check_item(&self, item: &ContentItem) -> Result<()> {
        validate_embedding(&item.embedding, self.dimension).map_err(|e| {
            MemoryError::IndexCorruption {
                fingerprint: item.fingerprint.clone(),
                reason: e.to_string(),
            }
        })
    }
}

fn rank(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| b.item.last_accessed_at.cmp(&a.item.last_accessed_at))
        .then_with(|| a.item.fingerprint.cmp(&b.item.fingerprint))
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, item: ContentItem) -> Result<Vec<Fingerprint>> {
        self.check_item(&item)?;

        let mut state = self.state.write().await;
        debug!("Upserting {}", item.fingerprint);
        state.insert(item);
        let evicted = state.evict_to(self.capacity);
        for fingerprint in &evicted {
            info!("Evicted least recently used item {}", fingerprint);
        }
        Ok(evicted)
    }

    async fn query(&self, query: &RetrievalQuery) -> Result<QueryOutcome> {
        if query.k == 0 {
            return Ok(QueryOutcome::default());
        }
        validate_embedding(&query.embedding, self.dimension)?;

        let state = self.state.read().await;
        let mut outcome = QueryOutcome::default();

        let candidates = state.items.values().filter(|item| match &query.host {
            Some(host) => item.matches_host(host),
            None => true,
        });
        for item in candidates {
            if validate_embedding(&item.embedding, self.dimension).is_err() {
                outcome.corrupted.push(item.fingerprint.clone());
                continue;
            }
            match similarity(&query.embedding, &item.embedding) {
                Some(score) if score >= query.min_similarity => {
                    outcome.hits.push(ScoredItem {
                        item: item.clone(),
                        similarity: score,
                    });
                }
                // zero vectors (text without content words) never match
                _ => {}
            }
        }

        outcome.hits.sort_by(rank);
        outcome.hits.truncate(query.k);
        outcome.corrupted.sort();
        Ok(outcome)
    }

    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ContentItem>> {
        Ok(self.state.read().await.items.get(fingerprint).cloned())
    }

    async fn get_by_content_id(&self, content_id: &str) -> Result<Option<ContentItem>> {
        let content_id = content_id.trim();
        let state = self.state.read().await;
        Ok(state
            .items
            .values()
            .filter(|item| item.content_id() == content_id)
            .min_by(|a, b| a.fingerprint.cmp(&b.fingerprint))
            .cloned())
    }

    async fn touch(&self, fingerprint: &Fingerprint) -> Result<Option<ContentItem>> {
        let mut state = self.state.write().await;
        let Some(mut item) = state.remove(fingerprint) else {
            return Ok(None);
        };
        let at = state.next_access_time();
        item.mark_accessed_at(at);
        let updated = item.clone();
        state.insert(item);
        Ok(Some(updated))
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<Option<ContentItem>> {
        Ok(self.state.write().await.remove(fingerprint))
    }

    async fn evict_if_over_capacity(&self) -> Result<Vec<Fingerprint>> {
        Ok(self.state.write().await.evict_to(self.capacity))
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Fingerprint>> {
        let mut state = self.state.write().await;
        let mut expired: Vec<Fingerprint> = state
            .items
            .values()
            .filter(|item| item.created_at < cutoff)
            .map(|item| item.fingerprint.clone())
            .collect();
        expired.sort();
        for fingerprint in &expired {
            state.remove(fingerprint);
        }
        if !expired.is_empty() {
            info!("Pruned {} items created before {}", expired.len(), cutoff);
        }
        Ok(expired)
    }

    async fn len(&self) -> usize {
        self.state.read().await.items.len()
    }

    async fn items(&self) -> Result<Vec<ContentItem>> {
        let state = self.state.read().await;
        let mut items: Vec<ContentItem> = state.items.values().cloned().collect();
        items.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(items)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let state = self.state.read().await;
        let mut stats = IndexStats {
            total_items: state.items.len(),
            capacity: self.capacity,
            ..IndexStats::default()
        };

        for item in state.items.values() {
            stats.total_chars += item.size();
            *stats
                .by_level
                .entry(item.compression_level.to_string())
                .or_default() += 1;
            let host = item.host().unwrap_or_else(|| "conversation".to_string());
            *stats.by_host.entry(host).or_default() += 1;
            stats.newest = stats.newest.max(Some(item.created_at));
            stats.oldest = Some(match stats.oldest {
                Some(oldest) => oldest.min(item.created_at),
                None => item.created_at,
            });
        }

        Ok(stats)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
