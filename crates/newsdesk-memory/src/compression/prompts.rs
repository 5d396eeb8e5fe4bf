//! Prompts for the remote summarizer
//!
//! Placeholders: {article} - the text to summarize, {instructions} and
//! {target_words} - filled in per style by `summary_prompt`. The compressor
//! re-checks the summary against the budget, so the word target is a hint.

use super::SummaryStyle;

pub const SUMMARY_PROMPT: &str = r#"Summarize the following news content for inclusion in a personalized newspaper.

{instructions}

Keep the summary under {target_words} words. Do not invent facts that are not in the text. Respond with the summary only, no preamble.

Content:
{article}"#;

fn style_instructions(style: SummaryStyle) -> &'static str {
    match style {
        SummaryStyle::Brief => "Write one or two sentences capturing the single most important point.",
        SummaryStyle::Balanced => {
            "Cover the main point and the most relevant supporting details in a short paragraph."
        }
        SummaryStyle::Detailed => {
            "Cover the main point, key supporting details, and any notable context or consequences."
        }
        SummaryStyle::Technical => {
            "Keep technical terms, version numbers, and measurements exact; favor specifics over narrative."
        }
    }
}

fn target_words(style: SummaryStyle) -> usize {
    match style {
        SummaryStyle::Brief => 50,
        SummaryStyle::Balanced => 100,
        SummaryStyle::Detailed => 220,
        SummaryStyle::Technical => 160,
    }
}

/// Build the summary prompt for a text and style
pub fn summary_prompt(article: &str, style: SummaryStyle) -> String {
    SUMMARY_PROMPT
        .replace("{instructions}", style_instructions(style))
        .replace("{target_words}", &target_words(style).to_string())
        .replace("{article}", article)
}
