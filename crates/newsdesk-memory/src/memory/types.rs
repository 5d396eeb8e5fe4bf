//! Content item stored in the vector index

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compression::CompressionLevel;
use crate::fingerprint::{Fingerprint, SourceRef};
use crate::text::{char_len, words};

/// Reading speed used for `reading_time_minutes`
pub const WORDS_PER_MINUTE: usize = 200;

/// One compressed piece of content with its embedding and access bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Cache key derived from the source
    pub fingerprint: Fingerprint,
    /// Canonical source reference
    pub source_ref: String,
    /// Size of the raw content in characters
    pub raw_size: usize,
    /// Text admitted into the working context
    pub compressed_text: String,
    /// Stage that produced `compressed_text`
    pub compression_level: CompressionLevel,
    /// Vector embedding of `compressed_text`
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Ingestion counts as the first access
    pub access_count: u32,
}

impl ContentItem {
    pub fn new(
        fingerprint: Fingerprint,
        source: &SourceRef,
        raw_size: usize,
        compressed_text: String,
        compression_level: CompressionLevel,
        embedding: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            fingerprint,
            source_ref: source.canonical(),
            raw_size,
            compressed_text,
            compression_level,
            embedding,
            created_at: now,
            last_accessed_at: now,
            access_count: 1,
        }
    }

    /// Record an access
    pub fn mark_accessed(&mut self) {
        self.mark_accessed_at(Utc::now());
    }

    /// Record an access at `at`; the access time never moves backwards
    pub fn mark_accessed_at(&mut self, at: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = at.max(self.last_accessed_at);
    }

    /// Characters this item occupies in a working context
    pub fn size(&self) -> usize {
        char_len(&self.compressed_text)
    }

    pub fn word_count(&self) -> usize {
        words(&self.compressed_text).count()
    }

    /// Estimated reading time, never less than one minute
    pub fn reading_time_minutes(&self) -> usize {
        self.word_count().div_ceil(WORDS_PER_MINUTE).max(1)
    }

    /// Parsed source, when the stored reference is still valid
    pub fn source(&self) -> Option<SourceRef> {
        SourceRef::parse(&self.source_ref).ok()
    }

    /// Host of a URL source
    pub fn host(&self) -> Option<String> {
        self.source()
            .and_then(|s| s.host().map(str::to_string))
    }

    /// Whether the source host is `host` or one of its subdomains.
    /// Conversation turns never match.
    pub fn matches_host(&self, host: &str) -> bool {
        let wanted = host.trim().trim_end_matches('.').to_ascii_lowercase();
        match self.host() {
            Some(own) if !wanted.is_empty() => {
                own == wanted
                    || own
                        .strip_suffix(wanted.as_str())
                        .is_some_and(|rest| rest.ends_with('.'))
            }
            _ => false,
        }
    }

    /// Compact id for agent prompts, e.g. `cnt_reuters_9f86d081`
    pub fn content_id(&self) -> String {
        match self.source() {
            Some(source) => self.fingerprint.short_id(&source),
            None => {
                let prefix: String = self.fingerprint.as_str().chars().take(8).collect();
                format!("cnt_item_{prefix}")
            }
        }
    }
}
