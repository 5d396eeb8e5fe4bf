//! Test utilities for newsdesk-memory: deterministic fetchers, summarizers
//! and a ready-made manager.
//!
//! Nothing here touches the network, so tests built on these helpers are
//! fast and reproducible.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::compression::{Compressor, SummarizeError, Summarizer, SummaryStyle};
use crate::embedding::{EMBEDDING_DIMENSION, HashedEmbedder};
use crate::fetch::{ContentFetcher, FetchError};
use crate::fingerprint::SourceRef;
use crate::index::InMemoryIndex;
use crate::memory::manager::{ManagerSettings, MemoryManager};

/// Fetcher serving fixed documents keyed by canonical source reference.
///
/// Unknown sources are reported as unreachable. Every call is counted, so
/// tests can assert that cache hits never fetch.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    documents: HashMap<String, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `text` for `source_ref`; panics on an invalid reference
    pub fn with(mut self, source_ref: &str, text: impl Into<String>) -> Self {
        let source = SourceRef::parse(source_ref).expect("valid test source reference");
        self.documents.insert(source.canonical(), text.into());
        self
    }

    /// Sleep before answering every fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for StaticFetcher {
    async fn fetch(&self, source: &SourceRef) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.documents
            .get(&source.canonical())
            .cloned()
            .ok_or_else(|| FetchError::Unreachable(format!("no fixture for {source}")))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Scripted behaviour for `ScriptedSummarizer`
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer immediately
    Reply(String),
    /// Answer after a delay
    Slow(Duration, String),
    /// Fail with an API error
    Fail(String),
}

/// Summarizer that follows a fixed script and counts its calls
#[derive(Debug)]
pub struct ScriptedSummarizer {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedSummarizer {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn reply(summary: impl Into<String>) -> Self {
        Self::new(Script::Reply(summary.into()))
    }

    pub fn slow(delay: Duration, summary: impl Into<String>) -> Self {
        Self::new(Script::Slow(delay, summary.into()))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(Script::Fail(message.into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(&self, _text: &str, _style: SummaryStyle) -> Result<String, SummarizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Reply(summary) => Ok(summary.clone()),
            Script::Slow(delay, summary) => {
                tokio::time::sleep(*delay).await;
                Ok(summary.clone())
            }
            Script::Fail(message) => Err(SummarizeError::ApiError(message.clone())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Manager over an empty in-memory index with default settings
pub fn test_manager(fetcher: StaticFetcher) -> MemoryManager {
    test_manager_with(
        Arc::new(fetcher),
        Compressor::default(),
        500,
        ManagerSettings::default(),
    )
}

/// Manager with explicit collaborators; the fetcher is shared so tests can
/// inspect its call count
pub fn test_manager_with(
    fetcher: Arc<StaticFetcher>,
    compressor: Compressor,
    index_capacity: usize,
    settings: ManagerSettings,
) -> MemoryManager {
    MemoryManager::new(
        fetcher,
        Arc::new(HashedEmbedder::new(EMBEDDING_DIMENSION)),
        compressor,
        Arc::new(InMemoryIndex::new(index_capacity, EMBEDDING_DIMENSION)),
        settings,
    )
}

/// Article of `sentences` distinct sentences about `topic`
pub fn article(topic: &str, sentences: usize) -> String {
    (0..sentences)
        .map(|i| format!("Report {i} covers {topic} developments in detail today."))
        .collect::<Vec<_>>()
        .join(" ")
}
