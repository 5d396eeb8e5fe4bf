//! Memory manager
//!
//! Orchestrates ingestion (fingerprint, cache lookup, reserve, fetch,
//! compress, embed, index, commit) and budget-aware retrieval for any number
//! of agent sessions sharing one index.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::budget::ReservationGuard;
use crate::compression::{
    Compressed, CompressionLevel, Compressor, RemoteSummarizer, SummaryStyle,
};
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, HashedEmbedder, clamp_input, validate_embedding};
use crate::error::{MemoryError, Result};
use crate::fetch::{ContentFetcher, FetchError, HttpFetcher};
use crate::fingerprint::{Fingerprint, SourceRef, fingerprint_source};
use crate::index::{InMemoryIndex, IndexSnapshot, IndexStats, RetrievalQuery, VectorIndex};
use crate::memory::retrieval::{RetrievedContent, fit_to_budget};
use crate::memory::session::{Session, SessionId};
use crate::memory::types::ContentItem;
use crate::text::char_len;

/// Ingestion states, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Start,
    Fingerprinted,
    CacheHit,
    CacheMiss,
    Reserving,
    Fetching,
    Compressing,
    Indexing,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Start => "start",
            IngestStage::Fingerprinted => "fingerprinted",
            IngestStage::CacheHit => "cache_hit",
            IngestStage::CacheMiss => "cache_miss",
            IngestStage::Reserving => "reserving",
            IngestStage::Fetching => "fetching",
            IngestStage::Compressing => "compressing",
            IngestStage::Indexing => "indexing",
            IngestStage::Committing => "committing",
            IngestStage::Done => "done",
            IngestStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One piece of content to admit into a session
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    pub source_ref: String,
    /// Extra parameters folded into the fingerprint
    pub params: Vec<(String, String)>,
    /// Defaults to the configured style
    pub style: Option<SummaryStyle>,
    /// Target size in characters; defaults to the configured item budget
    pub budget: Option<usize>,
    /// Raw text supplied by the caller instead of fetching
    pub text: Option<String>,
}

impl IngestRequest {
    pub fn new(source_ref: impl Into<String>) -> Self {
        Self {
            source_ref: source_ref.into(),
            params: Vec::new(),
            style: None,
            budget: None,
            text: None,
        }
    }

    pub fn with_style(mut self, style: SummaryStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Outcome of a successful ingestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub fingerprint: Fingerprint,
    pub content_id: String,
    pub source_ref: String,
    pub cache_hit: bool,
    pub level: CompressionLevel,
    /// Characters admitted into the working context
    pub size: usize,
    pub raw_size: usize,
    /// Characters charged to the session budget by this call
    pub charged: usize,
    pub access_count: u32,
    /// Items pushed out of the index to make room
    pub evicted: Vec<Fingerprint>,
    /// The admitted text, which may be a shorter view of the stored item
    pub text: String,
}

impl IngestReport {
    fn new(item: &ContentItem, cache_hit: bool, charged: usize, evicted: Vec<Fingerprint>) -> Self {
        Self {
            fingerprint: item.fingerprint.clone(),
            content_id: item.content_id(),
            source_ref: item.source_ref.clone(),
            cache_hit,
            level: item.compression_level,
            size: item.size(),
            raw_size: item.raw_size,
            charged,
            access_count: item.access_count,
            evicted,
            text: item.compressed_text.clone(),
        }
    }

    /// Replace the admitted text with a recompressed view
    fn with_view(mut self, view: Compressed) -> Self {
        self.level = view.level;
        self.size = view.len();
        self.text = view.text;
        self
    }
}

/// Tunables the manager reads from `Config`
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub session_capacity: usize,
    pub default_item_budget: usize,
    pub default_style: SummaryStyle,
    pub min_similarity: f32,
    pub max_age_days: u32,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ManagerSettings {
    fn from(config: &Config) -> Self {
        Self {
            session_capacity: config.budget.session_capacity,
            default_item_budget: config.budget.default_item_budget,
            default_style: config.compression.default_style,
            min_similarity: config.index.min_similarity,
            max_age_days: config.index.max_age_days,
        }
    }
}

pub struct MemoryManager {
    fetcher: Arc<dyn ContentFetcher>,
    embedder: Arc<dyn EmbeddingProvider>,
    compressor: Arc<Compressor>,
    index: Arc<dyn VectorIndex>,
    sessions: DashMap<SessionId, Arc<Session>>,
    settings: ManagerSettings,
}

impl MemoryManager {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        embedder: Arc<dyn EmbeddingProvider>,
        compressor: Compressor,
        index: Arc<dyn VectorIndex>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            fetcher,
            embedder,
            compressor: Arc::new(compressor),
            index,
            sessions: DashMap::new(),
            settings,
        }
    }

    /// Build a manager from configuration, restoring the index snapshot if
    /// one exists at `storage.snapshot_path()`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let fetcher = Arc::new(HttpFetcher::new(&config.fetcher)?);
        let embedder = embedder_from_config(config)?;

        let mut compressor = Compressor::new(&config.compression);
        if config.summarizer.enabled {
            let summarizer = RemoteSummarizer::new(&config.summarizer)
                .map_err(|e| MemoryError::Config(e.to_string()))?;
            compressor = compressor.with_summarizer(
                Arc::new(summarizer),
                Duration::from_secs(config.compression.semantic_timeout_secs),
            );
        }

        let index = match IndexSnapshot::load(&config.storage.snapshot_path()).await? {
            Some(snapshot) => {
                if snapshot.dimension != embedder.dimension() {
                    return Err(MemoryError::Storage(format!(
                        "snapshot was built with {}-dimensional embeddings but the {} provider produces {}",
                        snapshot.dimension,
                        embedder.name(),
                        embedder.dimension()
                    )));
                }
                InMemoryIndex::from_snapshot(snapshot, config.index.capacity)
            }
            None => InMemoryIndex::new(config.index.capacity, embedder.dimension()),
        };

        info!(
            "Memory manager ready (embedder: {}, summarizer: {})",
            embedder.name(),
            if compressor.has_summarizer() { "remote" } else { "none" }
        );

        Ok(Self::new(
            fetcher,
            embedder,
            compressor,
            Arc::new(index),
            ManagerSettings::from(config),
        ))
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    /// Open a session with a fresh id
    pub fn open_session(&self, capacity: Option<usize>) -> Arc<Session> {
        self.open_session_with_id(SessionId::generate(), capacity)
    }

    /// Open (or return the already open) session with `id`
    pub fn open_session_with_id(&self, id: SessionId, capacity: Option<usize>) -> Arc<Session> {
        let capacity = capacity.unwrap_or(self.settings.session_capacity);
        let session = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| {
                debug!("Opening session {} with capacity {}", id, capacity);
                Arc::new(Session::new(id, capacity))
            });
        Arc::clone(session.value())
    }

    pub fn session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    pub fn close_session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Ingest one source into a session's working context
    pub async fn ingest(
        &self,
        session: &Session,
        source_ref: &str,
        style: SummaryStyle,
        budget: usize,
    ) -> Result<IngestReport> {
        let request = IngestRequest::new(source_ref)
            .with_style(style)
            .with_budget(budget);
        self.ingest_request(session, request).await
    }

    /// Ingest caller-supplied text, typically a conversation turn
    pub async fn ingest_text(
        &self,
        session: &Session,
        source_ref: &str,
        text: &str,
        style: SummaryStyle,
        budget: usize,
    ) -> Result<IngestReport> {
        let request = IngestRequest::new(source_ref)
            .with_text(text)
            .with_style(style)
            .with_budget(budget);
        self.ingest_request(session, request).await
    }

    /// Run several ingestions for one session concurrently.
    ///
    /// Results are returned in request order; one failure does not affect
    /// the others.
    pub async fn ingest_batch(
        &self,
        session: &Session,
        requests: Vec<IngestRequest>,
    ) -> Vec<Result<IngestReport>> {
        join_all(
            requests
                .into_iter()
                .map(|request| self.ingest_request(session, request)),
        )
        .await
    }

    pub async fn ingest_request(
        &self,
        session: &Session,
        request: IngestRequest,
    ) -> Result<IngestReport> {
        let source_ref = request.source_ref.clone();
        let result = self.run_ingest(session, request).await;
        if let Err(ref e) = result {
            debug!("Ingest {} -> {}", source_ref, IngestStage::Failed);
            warn!(
                "Ingestion of {} failed for session {}: {}",
                source_ref,
                session.id(),
                e.reason()
            );
        }
        result
    }

    async fn run_ingest(&self, session: &Session, request: IngestRequest) -> Result<IngestReport> {
        let stage = |s: IngestStage| debug!("Ingest {} -> {}", request.source_ref, s);
        stage(IngestStage::Start);

        let budget = request.budget.unwrap_or(self.settings.default_item_budget);
        if budget == 0 {
            return Err(MemoryError::InvalidRequest(
                "budget must be at least one character".into(),
            ));
        }
        let style = request.style.unwrap_or(self.settings.default_style);

        let source = SourceRef::parse(&request.source_ref)?;
        let fingerprint = fingerprint_source(&source, &request.params);
        stage(IngestStage::Fingerprinted);

        if let Some(cached) = self.index.get(&fingerprint).await? {
            stage(IngestStage::CacheHit);
            let report = self.admit_cached(session, cached, budget, style).await?;
            stage(IngestStage::Done);
            return Ok(report);
        }
        stage(IngestStage::CacheMiss);

        stage(IngestStage::Reserving);
        let reservation =
            ReservationGuard::reserve(session.ledger(), self.compressor.ceiling(budget))?;

        stage(IngestStage::Fetching);
        let raw = match request.text {
            Some(text) => text,
            None => self.fetcher.fetch(&source).await?,
        };
        if raw.trim().is_empty() {
            return Err(FetchError::Empty.into());
        }
        let raw = raw.trim();

        stage(IngestStage::Compressing);
        let compressed = self.compressor.compress(raw, budget, style).await;

        stage(IngestStage::Indexing);
        let embedding = self.embedder.embed(clamp_input(&compressed.text)).await?;
        validate_embedding(&embedding, self.index.dimension())?;

        let size = compressed.len();
        // Already paid for by an earlier admission of the same source
        let paid = session.admitted_size(&fingerprint).unwrap_or(0);
        let charged = size.saturating_sub(paid);
        reservation.shrink(charged);

        let item = ContentItem::new(
            fingerprint,
            &source,
            char_len(raw),
            compressed.text,
            compressed.level,
            embedding,
        );
        let report_item = item.clone();
        let evicted = self.index.upsert(item).await?;

        stage(IngestStage::Committing);
        reservation.commit();
        session.record_admitted(report_item.fingerprint.clone(), size);

        stage(IngestStage::Done);
        debug!(
            "Ingested {} at level {} ({} -> {} chars)",
            report_item.source_ref, report_item.compression_level, report_item.raw_size, size
        );
        Ok(IngestReport::new(&report_item, false, charged, evicted))
    }

    /// Admit an already indexed item into `session`.
    ///
    /// The session pays for the characters it receives the first time, and
    /// afterwards only for growth beyond what it already holds. A stored item
    /// larger than the budget ceiling is recompressed into a view that fits;
    /// the stored item itself is left unchanged.
    async fn admit_cached(
        &self,
        session: &Session,
        cached: ContentItem,
        budget: usize,
        style: SummaryStyle,
    ) -> Result<IngestReport> {
        let fingerprint = cached.fingerprint.clone();
        let ceiling = self.compressor.ceiling(budget);
        let paid = session.admitted_size(&fingerprint).unwrap_or(0);

        let upper = cached.size().min(ceiling);
        let reservation = ReservationGuard::reserve(session.ledger(), upper.saturating_sub(paid))?;

        let view = if cached.size() > ceiling {
            Some(self.compressor.compress(&cached.compressed_text, budget, style).await)
        } else {
            None
        };
        let size = view.as_ref().map_or(cached.size(), Compressed::len);
        let charged = size.saturating_sub(paid);
        reservation.shrink(charged);

        let item = self.index.touch(&fingerprint).await?.unwrap_or(cached);
        reservation.commit();
        session.record_admitted(fingerprint, size);

        debug!(
            "Cache hit for {} in session {} (access count {}, charged {})",
            item.fingerprint,
            session.id(),
            item.access_count,
            charged
        );
        let report = IngestReport::new(&item, true, charged, Vec::new());
        Ok(match view {
            Some(view) => report.with_view(view),
            None => report,
        })
    }

    /// Most relevant stored items for `query`, trimmed to fit the session's
    /// available budget. Retrieval does not consume budget.
    pub async fn retrieve(
        &self,
        session: &Session,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedContent>> {
        self.retrieve_filtered(session, query, k, None).await
    }

    /// Like [`retrieve`](Self::retrieve), restricted to items from `host`
    /// or its subdomains. The filter applies before the top `k` are taken.
    pub async fn retrieve_filtered(
        &self,
        session: &Session,
        query: &str,
        k: usize,
        host: Option<&str>,
    ) -> Result<Vec<RetrievedContent>> {
        let query = query.trim();
        if k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(clamp_input(query)).await?;
        let mut request =
            RetrievalQuery::new(embedding, k).with_min_similarity(self.settings.min_similarity);
        if let Some(host) = host {
            request = request.with_host(host);
        }
        let outcome = self.index.query(&request).await?;

        for fingerprint in &outcome.corrupted {
            warn!("Dropping corrupted item {} from the index", fingerprint);
            self.index.remove(fingerprint).await?;
        }

        let available = session.budget_status().available();
        let ranked = outcome.hits.len();
        let hits = fit_to_budget(outcome.hits, available);
        if hits.len() < ranked {
            debug!(
                "Trimmed {} of {} hits to fit {} available chars",
                ranked - hits.len(),
                ranked,
                available
            );
        }

        // Lowest rank first, so the top hit ends up most recently accessed
        // and equally similar items keep their relative order next time.
        let mut results = Vec::with_capacity(hits.len());
        for hit in hits.into_iter().rev() {
            let item = match self.index.touch(&hit.item.fingerprint).await? {
                Some(updated) => updated,
                None => hit.item,
            };
            results.push(RetrievedContent::new(item, hit.similarity));
        }
        results.reverse();
        Ok(results)
    }

    /// Stored item whose short content id is `content_id`
    pub async fn get_by_content_id(&self, content_id: &str) -> Result<Option<ContentItem>> {
        self.index.get_by_content_id(content_id.trim()).await
    }

    /// Remove items older than `index.max_age_days`
    pub async fn prune_expired(&self) -> Result<Vec<Fingerprint>> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.settings.max_age_days));
        self.index.prune_older_than(cutoff).await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        self.index.stats().await
    }

    pub async fn snapshot(&self) -> Result<IndexSnapshot> {
        Ok(IndexSnapshot::new(
            self.index.dimension(),
            self.index.items().await?,
        ))
    }

    /// Persist the index at `storage.snapshot_path()`
    pub async fn save(&self, config: &Config) -> Result<()> {
        self.snapshot()
            .await?
            .save(&config.storage.snapshot_path())
            .await
    }
}

fn embedder_from_config(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider.as_str() {
        "hashed" => Ok(Arc::new(HashedEmbedder::new(config.embedding.dimension))),
        #[cfg(feature = "embed-local")]
        "fastembed" => Ok(Arc::new(crate::embedding::LocalEmbedder::new()?)),
        #[cfg(not(feature = "embed-local"))]
        "fastembed" => Err(MemoryError::Config(
            "the fastembed provider requires the embed-local feature".into(),
        )),
        other => Err(MemoryError::Config(format!(
            "unknown embedding provider {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StaticFetcher, test_manager};

    #[test]
    fn test_stage_names() {
        assert_eq!(IngestStage::CacheHit.to_string(), "cache_hit");
        assert_eq!(IngestStage::Failed.to_string(), "failed");
    }

    #[test]
    fn test_open_session_with_id_is_idempotent() {
        let manager = test_manager(StaticFetcher::new());
        let id = SessionId::try_from("morning").unwrap();
        let a = manager.open_session_with_id(id.clone(), Some(100));
        let b = manager.open_session_with_id(id.clone(), Some(900));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.budget_status().capacity, 100);
        assert_eq!(manager.session_count(), 1);
        assert!(manager.close_session(&id).is_some());
        assert!(manager.session(&id).is_none());
    }

    #[tokio::test]
    async fn test_zero_budget_is_rejected() {
        let manager = test_manager(StaticFetcher::new());
        let session = manager.open_session(None);
        let err = manager
            .ingest(&session, "https://a.com/x", SummaryStyle::Brief, 0)
            .await
            .unwrap_err();
        assert!(err.reason().starts_with("invalid request"));
    }

    #[test]
    fn test_unknown_embedding_provider() {
        let mut config = Config::default();
        config.embedding.provider = "word2vec".into();
        assert!(matches!(
            embedder_from_config(&config),
            Err(MemoryError::Config(_))
        ));
    }
}
