//! HTTP and file fetcher
//!
//! Fetches `http`/`https` sources with reqwest and `file://` sources from the
//! local filesystem. Conversation turns are never fetched; their text is
//! handed to the memory manager directly.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{ContentFetcher, FetchError};
use crate::config::FetcherConfig;
use crate::fingerprint::SourceRef;

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    async fn fetch_http(&self, url: &url::Url) -> Result<String, FetchError> {
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        if body.len() > self.max_bytes {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        Ok(body)
    }

    async fn fetch_file(&self, url: &url::Url) -> Result<String, FetchError> {
        let path = url
            .to_file_path()
            .map_err(|_| FetchError::Unsupported(format!("not a local path: {url}")))?;

        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.len() as usize > self.max_bytes {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        Ok(tokio::fs::read_to_string(&path).await?)
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, source: &SourceRef) -> Result<String, FetchError> {
        let body = match source {
            SourceRef::Url(url) if url.scheme() == "file" => self.fetch_file(url).await?,
            SourceRef::Url(url) => self.fetch_http(url).await?,
            SourceRef::Turn { .. } => {
                return Err(FetchError::Unsupported(source.canonical()));
            }
        };

        if body.trim().is_empty() {
            return Err(FetchError::Empty);
        }

        Ok(body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
