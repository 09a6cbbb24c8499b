// Google Custom Search provider. Instead of generating an answer it returns
// a digest of regulatory search results, which the caller classifies with
// its own rules. Transient failures are retried with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use aiact_core::config::SearchConfig;

use crate::provider::{
    http_client, truncate_body, Completion, CompletionRequest, Provider, ProviderError,
    ProviderKind,
};

const MAX_QUERY_CHARS: usize = 200;

pub struct GoogleSearchClient {
    http: reqwest::Client,
    api_key: String,
    engine_id: String,
    base_url: String,
    results: u32,
    max_retries: u32,
    initial_backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    pub link: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchHit>,
}

impl GoogleSearchClient {
    pub fn new(
        api_key: String,
        engine_id: String,
        config: &SearchConfig,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client(config.timeout_secs)?,
            api_key,
            engine_id,
            base_url: config.base_url.clone(),
            results: config.results,
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        })
    }

    /// Run `query`, retrying retryable failures up to `max_retries` times
    /// with a delay that doubles after each attempt.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError> {
        let mut delay = self.initial_backoff;
        let mut attempt: u32 = 0;
        loop {
            match self.search_once(query).await {
                Ok(hits) => return Ok(hits),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "search failed, backing off: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn search_once(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError> {
        let num = self.results.to_string();
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let parsed: SearchResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Malformed(format!("invalid search response: {e}")))?;
        debug!(hits = parsed.items.len(), "search results received");
        Ok(parsed.items)
    }
}

#[async_trait]
impl Provider for GoogleSearchClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GoogleSearch
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        if self.api_key.is_empty() || self.engine_id.is_empty() {
            return Err(ProviderError::NotConfigured);
        }
        let query = match &request.search_query {
            Some(q) if !q.trim().is_empty() => q.trim().to_string(),
            _ => request.user.chars().take(MAX_QUERY_CHARS).collect(),
        };

        let hits = self.search(&query).await?;
        if hits.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        Ok(Completion {
            provider: ProviderKind::GoogleSearch,
            text: format_digest(&hits),
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

/// One line per hit: `- title: snippet (link)`.
pub fn format_digest(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|h| {
            let snippet = h.snippet.split_whitespace().collect::<Vec<_>>().join(" ");
            format!("- {}: {} ({})", h.title.trim(), snippet, h.link.trim())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
