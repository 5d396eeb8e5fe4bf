//! Remote summarizer using OpenAI-compatible APIs
//!
//! Implements the Summarizer trait for remote LLM APIs via HTTP.
//! Supports any OpenAI-compatible endpoint with configurable URL, model,
//! and API key via environment variable.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::prompts::summary_prompt;
use super::summarizer::{SummarizeError, Summarizer};
use super::SummaryStyle;
use crate::config::SummarizerConfig;

const MAX_RETRIES: u32 = 3;

/// Remote summarizer using OpenAI-compatible HTTP APIs
#[derive(Debug)]
pub struct RemoteSummarizer {
    client: Client,
    config: SummarizerConfig,
    api_key: String,
    initial_backoff: Duration,
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl RemoteSummarizer {
    /// Create a new remote summarizer with the given configuration
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`.
    pub fn new(config: &SummarizerConfig) -> Result<Self, SummarizeError> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            SummarizeError::ConfigError(format!(
                "API key env var '{}' not set",
                config.api_key_env
            ))
        })?;
        Self::with_api_key(config, api_key)
    }

    /// Create a remote summarizer with an explicit API key
    pub fn with_api_key(
        config: &SummarizerConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, SummarizeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SummarizeError::ApiError(e.to_string()))?;

        info!(
            "RemoteSummarizer initialized with model: {}, api_url: {}",
            config.model, config.api_url
        );

        Ok(Self {
            client,
            config: config.clone(),
            api_key: api_key.into(),
            initial_backoff: Duration::from_secs(1),
        })
    }

    /// Override the first retry delay (doubles on every retry)
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Call the remote API with exponential backoff on 429 and transport errors
    async fn call_api(&self, prompt: String) -> Result<String, SummarizeError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: "You are a precise news editor.".to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            temperature: 0.2,
            max_tokens: self.config.max_tokens,
        };

        let url = format!(
            "{}/chat/completions",
            self.config.api_url.trim_end_matches('/')
        );
        debug!("Calling remote API at: {}", url);

        let mut last_error = None;
        let mut delay = self.initial_backoff;

        for attempt in 0..MAX_RETRIES {
            match self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status == 429 {
                        last_error = Some(SummarizeError::RateLimited(attempt + 1));
                        if attempt < MAX_RETRIES - 1 {
                            warn!(
                                "Rate limited on attempt {}/{}, waiting {:?}",
                                attempt + 1,
                                MAX_RETRIES,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                            delay *= 2;
                        }
                        continue;
                    }

                    if !status.is_success() {
                        let error_text = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(SummarizeError::ApiError(format!(
                            "API returned {status}: {error_text}"
                        )));
                    }

                    let completion: ChatCompletionResponse = response
                        .json()
                        .await
                        .map_err(|e| SummarizeError::ParseError(e.to_string()))?;

                    return completion
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| SummarizeError::ApiError("Empty response".to_string()));
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if attempt < MAX_RETRIES - 1 {
                        warn!(
                            "Request failed on attempt {}/{}, retrying: {}",
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                    last_error = Some(SummarizeError::ApiError(err_msg));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SummarizeError::ApiError("Unknown error".to_string())))
    }
}

#[async_trait]
impl Summarizer for RemoteSummarizer {
    async fn summarize(&self, text: &str, style: SummaryStyle) -> Result<String, SummarizeError> {
        let prompt = summary_prompt(text, style);
        let summary = self.call_api(prompt).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(SummarizeError::Empty);
        }
        Ok(summary.to_string())
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(api_url: String) -> SummarizerConfig {
        SummarizerConfig {
            enabled: true,
            api_url,
            model: "gpt-4o-mini".to_string(),
            api_key_env: "NEWSDESK_TEST_MISSING_KEY".to_string(),
            timeout_secs: 5,
            max_tokens: 256,
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "content": content } }]
        })
    }

    #[test]
    fn test_new_missing_api_key() {
        let config = create_test_config("https://api.example.com/v1".to_string());
        let err = RemoteSummarizer::new(&config).unwrap_err();
        assert!(err.to_string().contains("NEWSDESK_TEST_MISSING_KEY"));
    }

    #[tokio::test]
    async fn test_summarize_returns_trimmed_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("  Rates rise again.  ")),
            )
            .mount(&mock_server)
            .await;

        let summarizer =
            RemoteSummarizer::with_api_key(&create_test_config(mock_server.uri()), "test-key")
                .unwrap();
        let summary = summarizer
            .summarize("The central bank raised rates.", SummaryStyle::Brief)
            .await
            .unwrap();
        assert_eq!(summary, "Rates rise again.");
    }

    #[tokio::test]
    async fn test_summarize_empty_content_is_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("   ")))
            .mount(&mock_server)
            .await;

        let summarizer =
            RemoteSummarizer::with_api_key(&create_test_config(mock_server.uri()), "k").unwrap();
        assert!(matches!(
            summarizer.summarize("text", SummaryStyle::Balanced).await,
            Err(SummarizeError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_summarize_api_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let summarizer =
            RemoteSummarizer::with_api_key(&create_test_config(mock_server.uri()), "k").unwrap();
        let err = summarizer
            .summarize("text", SummaryStyle::Balanced)
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizeError::ApiError(msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_summarize_rate_limited_exhausts_retries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&mock_server)
            .await;

        let summarizer =
            RemoteSummarizer::with_api_key(&create_test_config(mock_server.uri()), "k")
                .unwrap()
                .with_initial_backoff(Duration::from_millis(1));
        let err = summarizer
            .summarize("text", SummaryStyle::Balanced)
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizeError::RateLimited(3)));
    }

    #[tokio::test]
    async fn test_final_rate_limit_returns_without_waiting() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&mock_server)
            .await;

        // waits 200ms + 400ms between attempts, never 800ms after the last
        let summarizer =
            RemoteSummarizer::with_api_key(&create_test_config(mock_server.uri()), "k")
                .unwrap()
                .with_initial_backoff(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = summarizer
            .summarize("text", SummaryStyle::Balanced)
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizeError::RateLimited(3)));
        assert!(
            started.elapsed() < Duration::from_millis(1_200),
            "took {:?}",
            started.elapsed()
        );
    }
}
