//! Staged content compression
//!
//! Reduces raw content to a character budget by walking an ordered list of
//! strategies: unchanged, truncated, extractive, semantic. Each call is
//! independent, so a single `Compressor` can serve many items in parallel.

pub mod prompts;
pub mod remote;
pub mod strategy;
pub mod summarizer;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CompressionConfig;
use crate::error::MemoryError;
use crate::text::char_len;

pub use remote::RemoteSummarizer;
pub use strategy::{
    Budget, CompressionStrategy, ExtractiveStrategy, SemanticStrategy, StageOutcome,
    TruncateStrategy, truncate_to,
};
pub use summarizer::{SummarizeError, Summarizer};

/// Stage that produced a compressed text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Content stored unchanged
    None,
    /// Cut on a sentence or word boundary
    Truncated,
    /// Subset of the original sentences
    Extractive,
    /// Abstractive summary
    Semantic,
}

impl CompressionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionLevel::None => "none",
            CompressionLevel::Truncated => "truncated",
            CompressionLevel::Extractive => "extractive",
            CompressionLevel::Semantic => "semantic",
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary style requested by the newspaper layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStyle {
    Brief,
    #[default]
    Balanced,
    Detailed,
    Technical,
}

impl SummaryStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStyle::Brief => "brief",
            SummaryStyle::Balanced => "balanced",
            SummaryStyle::Detailed => "detailed",
            SummaryStyle::Technical => "technical",
        }
    }
}

impl fmt::Display for SummaryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryStyle {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brief" => Ok(SummaryStyle::Brief),
            "balanced" => Ok(SummaryStyle::Balanced),
            "detailed" => Ok(SummaryStyle::Detailed),
            "technical" => Ok(SummaryStyle::Technical),
            other => Err(MemoryError::Config(format!(
                "unknown summary style {other:?} (expected brief, balanced, detailed or technical)"
            ))),
        }
    }
}

/// Output of a compression call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressed {
    pub text: String,
    pub level: CompressionLevel,
}

impl Compressed {
    pub fn len(&self) -> usize {
        char_len(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

pub struct Compressor {
    /// Slack in basis points of the target budget
    slack_bp: usize,
    truncate: TruncateStrategy,
    extractive: ExtractiveStrategy,
    semantic: Option<SemanticStrategy>,
}

impl Compressor {
    pub fn new(config: &CompressionConfig) -> Self {
        Self {
            slack_bp: (config.slack_ratio.clamp(0.0, 1.0) * 10_000.0).round() as usize,
            truncate: TruncateStrategy,
            extractive: ExtractiveStrategy::new(config.lead_bias, config.min_extractive_fill),
            semantic: None,
        }
    }

    /// Enable the semantic stage
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>, timeout: Duration) -> Self {
        self.semantic = Some(SemanticStrategy::new(summarizer, timeout));
        self
    }

    pub fn has_summarizer(&self) -> bool {
        self.semantic.is_some()
    }

    /// Largest output admitted for a target budget
    pub fn ceiling(&self, target: usize) -> usize {
        target + (target * self.slack_bp).div_ceil(10_000)
    }

    fn plan(&self, style: SummaryStyle) -> Vec<&dyn CompressionStrategy> {
        if style == SummaryStyle::Brief {
            return vec![&self.truncate];
        }

        let mut stages: Vec<&dyn CompressionStrategy> = vec![&self.extractive];
        if let Some(ref semantic) = self.semantic {
            stages.push(semantic);
        }
        stages
    }

    /// Compress `text` to `target` characters.
    ///
    /// Text already within the ceiling is returned unchanged, which makes the
    /// operation idempotent. Stage failures (including summarizer timeouts)
    /// are logged and absorbed; the last resort is truncation.
    pub async fn compress(&self, text: &str, target: usize, style: SummaryStyle) -> Compressed {
        let budget = Budget {
            target,
            ceiling: self.ceiling(target),
        };

        if char_len(text) <= budget.ceiling {
            return Compressed {
                text: text.to_string(),
                level: CompressionLevel::None,
            };
        }

        let mut fallback: Option<Compressed> = None;

        for stage in self.plan(style) {
            match stage.apply(text, budget, style).await {
                Ok(StageOutcome::Fits(output)) => {
                    debug!(
                        "Compressed {} -> {} chars at level {}",
                        char_len(text),
                        char_len(&output),
                        stage.level()
                    );
                    return Compressed {
                        text: output,
                        level: stage.level(),
                    };
                }
                Ok(StageOutcome::Partial(output)) => {
                    debug!("Stage {} underfilled, keeping as fallback", stage.level());
                    if fallback.is_none() {
                        fallback = Some(Compressed {
                            text: output,
                            level: stage.level(),
                        });
                    }
                }
                Ok(StageOutcome::Skipped) => {
                    debug!("Stage {} not applicable", stage.level());
                }
                Err(e) => {
                    warn!("Stage {} failed, falling back: {}", stage.level(), e);
                }
            }
        }

        fallback.unwrap_or_else(|| Compressed {
            text: truncate_to(text, target),
            level: CompressionLevel::Truncated,
        })
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(&CompressionConfig::default())
    }
}
