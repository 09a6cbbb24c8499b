// The provider abstraction shared by every outbound model or search API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Provider identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    DeepSeek,
    Gemini,
    GoogleSearch,
}

impl ProviderKind {
    /// Parse the name used in `analysis.provider_order`.
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name {
            "deepseek" => Some(ProviderKind::DeepSeek),
            "gemini" => Some(ProviderKind::Gemini),
            "google_search" => Some(ProviderKind::GoogleSearch),
            _ => None,
        }
    }

    pub fn config_name(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Gemini => "gemini",
            ProviderKind::GoogleSearch => "google_search",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::DeepSeek => "DeepSeek",
            ProviderKind::Gemini => "Gemini",
            ProviderKind::GoogleSearch => "Google Search",
        })
    }
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Short keyword query for search providers. Model providers ignore it.
    pub search_query: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub provider: ProviderKind,
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured")]
    NotConfigured,

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Transport(String),

    #[error("response contained no content")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Rate limiting, server errors and network failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Transport(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Malformed(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

/// Build an HTTP client with a whole-request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))
}

/// Trim a response body for error messages.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    let body = body.trim();
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_names_round_trip() {
        for kind in [
            ProviderKind::DeepSeek,
            ProviderKind::Gemini,
            ProviderKind::GoogleSearch,
        ] {
            assert_eq!(ProviderKind::from_config_name(kind.config_name()), Some(kind));
        }
        assert_eq!(ProviderKind::from_config_name("openai"), None);
    }

    #[test]
    fn retryable_statuses() {
        let status = |s| ProviderError::Status {
            status: s,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(ProviderError::Transport("reset".into()).is_retryable());
        assert!(!ProviderError::EmptyResponse.is_retryable());
        assert!(!ProviderError::NotConfigured.is_retryable());
    }

    #[test]
    fn truncate_body_limits_length() {
        assert_eq!(truncate_body("  short  "), "short");
        let long = "x".repeat(1000);
        let cut = truncate_body(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.len(), 303);
    }
}
