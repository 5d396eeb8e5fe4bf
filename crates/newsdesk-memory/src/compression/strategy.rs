//! Compression stages
//!
//! Every stage implements `CompressionStrategy`; the compressor walks an
//! ordered list of them and stops at the first one whose output fits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::summarizer::Summarizer;
use super::{CompressionLevel, SummaryStyle};
use crate::error::{MemoryError, Result};
use crate::text::{byte_offset, char_len, content_words, split_sentences, words};

/// Target size and hard ceiling for one compression call, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub target: usize,
    pub ceiling: usize,
}

/// Result of running one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Output fits the budget; stop here
    Fits(String),
    /// Output fits the ceiling but underfills the target; keep as fallback
    Partial(String),
    /// Stage not applicable to this input
    Skipped,
}

#[async_trait]
pub trait CompressionStrategy: Send + Sync {
    /// Level reported when this stage produces the final output
    fn level(&self) -> CompressionLevel;

    async fn apply(&self, text: &str, budget: Budget, style: SummaryStyle)
    -> Result<StageOutcome>;
}

/// Cut `text` to at most `limit` characters without splitting a word.
///
/// Prefers the last sentence end inside the window when it keeps at least
/// half of it; a single token longer than `limit` is cut at `limit`.
pub fn truncate_to(text: &str, limit: usize) -> String {
    let text = text.trim();
    if char_len(text) <= limit {
        return text.to_string();
    }

    let cut = byte_offset(text, limit);
    let window = &text[..cut];

    let mut last_sentence_end = None;
    let mut chars = window.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            let next = match chars.peek() {
                Some((_, n)) => Some(*n),
                None => text[end..].chars().next(),
            };
            if next.is_none_or(char::is_whitespace) {
                last_sentence_end = Some(end);
            }
        }
    }

    if let Some(end) = last_sentence_end {
        if char_len(&window[..end]) * 2 >= limit {
            return window[..end].to_string();
        }
    }

    if text[cut..].starts_with(char::is_whitespace) {
        return window.trim_end().to_string();
    }

    match window.rfind(char::is_whitespace) {
        Some(ws) if !window[..ws].trim_end().is_empty() => window[..ws].trim_end().to_string(),
        _ => window.to_string(),
    }
}

/// Hard cut on a sentence or word boundary
#[derive(Debug, Clone, Default)]
pub struct TruncateStrategy;

#[async_trait]
impl CompressionStrategy for TruncateStrategy {
    fn level(&self) -> CompressionLevel {
        CompressionLevel::Truncated
    }

    async fn apply(
        &self,
        text: &str,
        budget: Budget,
        _style: SummaryStyle,
    ) -> Result<StageOutcome> {
        Ok(StageOutcome::Fits(truncate_to(text, budget.target)))
    }
}

/// Selects the highest-scoring sentences until the budget is filled.
///
/// Score = keyword density (mean document frequency of the sentence's
/// content words, normalized to 0-1) + `lead_bias / (1 + position)`.
#[derive(Debug, Clone)]
pub struct ExtractiveStrategy {
    pub lead_bias: f32,
    pub min_fill: f32,
}

impl ExtractiveStrategy {
    pub fn new(lead_bias: f32, min_fill: f32) -> Self {
        Self {
            lead_bias,
            min_fill: min_fill.clamp(0.0, 1.0),
        }
    }

    pub fn score_sentences(&self, sentences: &[&str]) -> Vec<f32> {
        let mut frequency: HashMap<String, usize> = HashMap::new();
        for sentence in sentences {
            for word in content_words(sentence) {
                *frequency.entry(word).or_default() += 1;
            }
        }
        let max_frequency = frequency.values().copied().max().unwrap_or(1).max(1) as f32;

        sentences
            .iter()
            .enumerate()
            .map(|(position, sentence)| {
                let total_words = words(sentence).count().max(1) as f32;
                let keyword_mass: f32 = content_words(sentence)
                    .map(|w| frequency.get(&w).copied().unwrap_or(0) as f32 / max_frequency)
                    .sum();
                let density = keyword_mass / total_words;
                let lead = self.lead_bias / (1.0 + position as f32);
                density + lead
            })
            .collect()
    }

    /// Pick sentences by descending score while they fit in `ceiling`,
    /// returning them joined in document order.
    pub fn select(&self, text: &str, budget: Budget) -> Option<String> {
        let sentences = split_sentences(text);
        if sentences.len() < 2 {
            return None;
        }

        let scores = self.score_sentences(&sentences);
        let mut order: Vec<usize> = (0..sentences.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then_with(|| a.cmp(&b)));

        let mut selected = Vec::new();
        let mut total = 0usize;
        for idx in order {
            let separator = usize::from(!selected.is_empty());
            let len = char_len(sentences[idx]);
            if total + separator + len <= budget.ceiling {
                selected.push(idx);
                total += separator + len;
            }
            if total >= budget.target {
                break;
            }
        }

        if selected.is_empty() {
            return None;
        }

        selected.sort_unstable();
        Some(
            selected
                .iter()
                .map(|&i| sentences[i])
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

#[async_trait]
impl CompressionStrategy for ExtractiveStrategy {
    fn level(&self) -> CompressionLevel {
        CompressionLevel::Extractive
    }

    async fn apply(
        &self,
        text: &str,
        budget: Budget,
        _style: SummaryStyle,
    ) -> Result<StageOutcome> {
        let Some(output) = self.select(text, budget) else {
            return Ok(StageOutcome::Skipped);
        };

        let fill = char_len(&output) as f32 / budget.target.max(1) as f32;
        debug!("Extractive selection fills {:.0}% of target", fill * 100.0);

        if fill >= self.min_fill {
            Ok(StageOutcome::Fits(output))
        } else {
            Ok(StageOutcome::Partial(output))
        }
    }
}

/// Abstractive summary from an external summarizer, bounded by a timeout
pub struct SemanticStrategy {
    summarizer: Arc<dyn Summarizer>,
    timeout: Duration,
}

impl SemanticStrategy {
    pub fn new(summarizer: Arc<dyn Summarizer>, timeout: Duration) -> Self {
        Self {
            summarizer,
            timeout,
        }
    }
}

#[async_trait]
impl CompressionStrategy for SemanticStrategy {
    fn level(&self) -> CompressionLevel {
        CompressionLevel::Semantic
    }

    async fn apply(&self, text: &str, budget: Budget, style: SummaryStyle) -> Result<StageOutcome> {
        let summary = tokio::time::timeout(self.timeout, self.summarizer.summarize(text, style))
            .await
            .map_err(|_| MemoryError::CompressionTimeout(self.timeout))?
            .map_err(|e| MemoryError::Summarization(e.to_string()))?;

        let summary = summary.trim();
        if summary.is_empty() {
            return Ok(StageOutcome::Skipped);
        }

        if char_len(summary) <= budget.ceiling {
            Ok(StageOutcome::Fits(summary.to_string()))
        } else {
            debug!(
                "{} summary exceeds ceiling ({} > {}), truncating",
                self.summarizer.name(),
                char_len(summary),
                budget.ceiling
            );
            Ok(StageOutcome::Fits(truncate_to(summary, budget.target)))
        }
    }
}
