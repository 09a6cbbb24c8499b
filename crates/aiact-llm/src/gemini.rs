// Google Gemini `generateContent` client (non-streaming).

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use aiact_core::config::ModelEndpoint;

use crate::provider::{
    http_client, truncate_body, Completion, CompletionRequest, Provider, ProviderError,
    ProviderKind,
};

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: String, config: &ModelEndpoint) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client(config.timeout_secs)?,
            api_key,
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
        })
    }
}

#[async_trait]
impl Provider for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured);
        }

        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.user }] }],
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
                "temperature": request.temperature
            }
        });

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
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

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Malformed(format!("invalid JSON: {e}")))?;
        let completion = parse_response(&value)?;
        debug!(
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "Gemini response received"
        );
        Ok(completion)
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Extract the answer text and token usage from a `generateContent` response.
///
/// Expected shape: `{ "candidates": [ { "content": { "parts": [ { "text": ".." } ] } } ],
/// "usageMetadata": { "promptTokenCount": N, "candidatesTokenCount": M } }`.
/// A `promptFeedback.blockReason` means the prompt was refused.
pub(crate) fn parse_response(v: &Value) -> Result<Completion, ProviderError> {
    if let Some(reason) = v
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(Value::as_str)
    {
        return Err(ProviderError::Malformed(format!("prompt blocked: {reason}")));
    }

    let parts = v
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .ok_or(ProviderError::EmptyResponse)?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }

    let usage = v.get("usageMetadata");
    let count = |key: &str| {
        usage
            .and_then(|u| u.get(key))
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or(0)
    };

    Ok(Completion {
        provider: ProviderKind::Gemini,
        text,
        input_tokens: count("promptTokenCount"),
        output_tokens: count("candidatesTokenCount"),
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_http;

    fn endpoint(base_url: String) -> ModelEndpoint {
        ModelEndpoint {
            base_url,
            model: "gemini-1.5-flash".into(),
            timeout_secs: 5,
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "system".into(),
            user: "Classify a chatbot.".into(),
            max_tokens: 128,
            temperature: 0.0,
            search_query: None,
        }
    }

    #[test]
    fn parse_response_joins_parts() {
        let v: Value = serde_json::from_str(
            r#"{
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "Limited" }, { "text": " risk" }] },
                    "finishReason": "STOP"
                }],
                "usageMetadata": { "promptTokenCount": 20, "candidatesTokenCount": 3 }
            }"#,
        )
        .unwrap();
        let c = parse_response(&v).unwrap();
        assert_eq!(c.text, "Limited risk");
        assert_eq!(c.input_tokens, 20);
        assert_eq!(c.output_tokens, 3);
    }

    #[test]
    fn parse_response_missing_usage_defaults_to_zero() {
        let v: Value = serde_json::from_str(
            r#"{ "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }] }"#,
        )
        .unwrap();
        let c = parse_response(&v).unwrap();
        assert_eq!((c.input_tokens, c.output_tokens), (0, 0));
    }

    #[test]
    fn parse_response_blocked_prompt() {
        let v: Value =
            serde_json::from_str(r#"{ "promptFeedback": { "blockReason": "SAFETY" } }"#).unwrap();
        let err = parse_response(&v).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn parse_response_without_candidates_is_empty() {
        let v: Value = serde_json::from_str(r#"{ "candidates": [] }"#).unwrap();
        assert!(matches!(parse_response(&v), Err(ProviderError::EmptyResponse)));
    }

    #[tokio::test]
    async fn mock_server_success() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"risk_level\":\"limited\"}"}]}}],"usageMetadata":{"promptTokenCount":11,"candidatesTokenCount":5}}"#;
        let (addr, server) = mock_http::serve(vec![mock_http::json_response("200 OK", body)]).await;

        let client = GeminiClient::new("gem-key".into(), &endpoint(format!("http://{addr}"))).unwrap();
        let c = client.complete(&request()).await.unwrap();
        assert_eq!(c.provider, ProviderKind::Gemini);
        assert_eq!(c.text, "{\"risk_level\":\"limited\"}");

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("POST /models/gemini-1.5-flash:generateContent?key=gem-key"));
        assert!(requests[0].contains("\"maxOutputTokens\":128"));
        assert!(requests[0].contains("systemInstruction"));
    }

    #[tokio::test]
    async fn mock_server_error_status() {
        let (addr, server) = mock_http::serve(vec![mock_http::json_response(
            "503 Service Unavailable",
            r#"{"error":{"message":"overloaded"}}"#,
        )])
        .await;

        let client = GeminiClient::new("gem-key".into(), &endpoint(format!("http://{addr}"))).unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(err.is_retryable());
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 503);
                assert!(body.contains("overloaded"));
            }
            other => panic!("expected Status, got {other:?}"),
        }
        let _ = server.await;
    }

    #[tokio::test]
    async fn empty_key_is_not_configured() {
        let client = GeminiClient::new(String::new(), &endpoint("http://127.0.0.1:9".into())).unwrap();
        assert!(matches!(
            client.complete(&request()).await,
            Err(ProviderError::NotConfigured)
        ));
    }
}
