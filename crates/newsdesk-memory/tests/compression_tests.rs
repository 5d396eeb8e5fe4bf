//! Integration tests for staged compression
//!
//! Exercises the size guarantee, idempotency and the fallback chain when the
//! summarizer is slow or failing.

use std::sync::Arc;
use std::time::Duration;

use newsdesk_memory::compression::{CompressionLevel, Compressor, SummaryStyle};
use newsdesk_memory::config::CompressionConfig;
use newsdesk_memory::testing::{ScriptedSummarizer, article};

const STYLES: [SummaryStyle; 4] = [
    SummaryStyle::Brief,
    SummaryStyle::Balanced,
    SummaryStyle::Detailed,
    SummaryStyle::Technical,
];

fn ten_thousand_chars() -> String {
    let text = article("markets", 220);
    text.chars().take(10_000).collect()
}

/// Lead sentence followed by one sentence too long for any small budget
fn lopsided(len: usize) -> String {
    format!("Rates held steady. {}", "inflation ".repeat(len / 10).trim_end())
}

#[tokio::test]
async fn test_brief_article_is_truncated_within_slack() {
    let compressor = Compressor::default();
    let text = ten_thousand_chars();
    assert_eq!(text.chars().count(), 10_000);

    let out = compressor.compress(&text, 500, SummaryStyle::Brief).await;
    assert_eq!(out.level, CompressionLevel::Truncated);
    assert!(out.len() <= 525, "got {} chars", out.len());
    assert!(text.starts_with(&out.text));
}

#[tokio::test]
async fn test_output_never_exceeds_ceiling() {
    let compressor = Compressor::default();
    let text = ten_thousand_chars();

    for style in STYLES {
        for budget in [1, 7, 40, 120, 333, 500, 1_200, 4_000, 9_999, 20_000] {
            let out = compressor.compress(&text, budget, style).await;
            assert!(
                out.len() <= compressor.ceiling(budget),
                "{style} at {budget}: {} chars",
                out.len()
            );
        }
    }
}

#[tokio::test]
async fn test_compression_is_idempotent() {
    let compressor = Compressor::default();
    let text = ten_thousand_chars();

    for style in STYLES {
        for budget in [60, 250, 800, 3_000] {
            let once = compressor.compress(&text, budget, style).await;
            let twice = compressor.compress(&once.text, budget, style).await;
            assert_eq!(once.text, twice.text, "{style} at {budget}");
        }
    }
}

#[tokio::test]
async fn test_extractive_keeps_document_order() {
    let compressor = Compressor::default();
    let text = article("energy", 30);
    let out = compressor.compress(&text, 400, SummaryStyle::Balanced).await;
    assert_eq!(out.level, CompressionLevel::Extractive);

    let mut last = 0;
    for sentence in newsdesk_memory::text::split_sentences(&out.text) {
        let pos = text.find(sentence).expect("selected sentence comes from the source");
        assert!(pos >= last);
        last = pos;
    }
}

#[tokio::test]
async fn test_semantic_stage_summarizes_when_extractive_underfills() {
    let summarizer = Arc::new(ScriptedSummarizer::reply("Rates held steady amid inflation."));
    let compressor = Compressor::default()
        .with_summarizer(summarizer.clone(), Duration::from_secs(1));

    let out = compressor
        .compress(&lopsided(2_000), 200, SummaryStyle::Detailed)
        .await;
    assert_eq!(out.level, CompressionLevel::Semantic);
    assert_eq!(out.text, "Rates held steady amid inflation.");
    assert_eq!(summarizer.calls(), 1);
}

#[tokio::test]
async fn test_brief_never_calls_summarizer() {
    let summarizer = Arc::new(ScriptedSummarizer::reply("unused"));
    let compressor = Compressor::default()
        .with_summarizer(summarizer.clone(), Duration::from_secs(1));

    let out = compressor
        .compress(&lopsided(2_000), 200, SummaryStyle::Brief)
        .await;
    assert_eq!(out.level, CompressionLevel::Truncated);
    assert_eq!(summarizer.calls(), 0);
}

#[tokio::test]
async fn test_semantic_timeout_falls_back_to_extractive_candidate() {
    let summarizer = Arc::new(ScriptedSummarizer::slow(
        Duration::from_secs(5),
        "too late",
    ));
    let compressor = Compressor::default()
        .with_summarizer(summarizer, Duration::from_millis(50));

    let out = compressor
        .compress(&lopsided(2_000), 200, SummaryStyle::Balanced)
        .await;
    assert_eq!(out.level, CompressionLevel::Extractive);
    assert_eq!(out.text, "Rates held steady.");
}

#[tokio::test]
async fn test_summarizer_failure_without_candidate_truncates() {
    let summarizer = Arc::new(ScriptedSummarizer::failing("upstream 503"));
    let compressor = Compressor::default()
        .with_summarizer(summarizer.clone(), Duration::from_secs(1));

    let text = "inflation ".repeat(300);
    let out = compressor.compress(&text, 150, SummaryStyle::Technical).await;
    assert_eq!(out.level, CompressionLevel::Truncated);
    assert!(out.len() <= 150);
    assert_eq!(summarizer.calls(), 1);
}

#[tokio::test]
async fn test_custom_slack_ratio() {
    let compressor = Compressor::new(&CompressionConfig {
        slack_ratio: 0.2,
        ..CompressionConfig::default()
    });
    assert_eq!(compressor.ceiling(500), 600);

    let text = "x".repeat(590);
    let out = compressor.compress(&text, 500, SummaryStyle::Brief).await;
    assert_eq!(out.level, CompressionLevel::None);
}
