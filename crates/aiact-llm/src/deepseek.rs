// DeepSeek chat-completions client using reqwest-eventsource.
//
// DeepSeek speaks the OpenAI-compatible `/chat/completions` protocol. The
// request is sent with `stream: true`; each SSE `data:` line carries a JSON
// chunk whose `choices[0].delta.content` is appended to the answer until the
// literal `[DONE]` sentinel arrives.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde_json::Value;
use tracing::{debug, warn};

use aiact_core::config::ModelEndpoint;

use crate::provider::{
    http_client, truncate_body, Completion, CompletionRequest, Provider, ProviderError,
    ProviderKind,
};

// ---------------------------------------------------------------------------
// DeepSeekClient
// ---------------------------------------------------------------------------

pub struct DeepSeekClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl DeepSeekClient {
    pub fn new(api_key: String, config: &ModelEndpoint) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
        })
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<Completion, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured);
        }

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user }
            ]
        });

        let builder = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = builder
            .eventsource()
            .map_err(|e| ProviderError::Transport(format!("failed to create event source: {e}")))?;

        let mut full_text = String::new();
        let mut input_tokens: u32 = 0;
        let mut output_tokens: u32 = 0;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    debug!("DeepSeek SSE connection opened");
                }
                Ok(Event::Message(msg)) => {
                    let data = msg.data.trim();
                    if data == "[DONE]" {
                        debug!("DeepSeek stream complete");
                        es.close();
                        return finish(full_text, input_tokens, output_tokens);
                    }
                    match parse_chunk(data) {
                        Some(chunk) => {
                            if let Some(text) = chunk.content {
                                full_text.push_str(&text);
                            }
                            if let Some((input, output)) = chunk.usage {
                                input_tokens = input;
                                output_tokens = output;
                            }
                        }
                        None => warn!("ignoring unparseable DeepSeek chunk"),
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    // Server closed without the sentinel; keep what arrived.
                    es.close();
                    return finish(full_text, input_tokens, output_tokens);
                }
                Err(err) => {
                    warn!(?err, "DeepSeek SSE stream error");
                    es.close();
                    return Err(into_provider_error(err).await);
                }
            }
        }

        finish(full_text, input_tokens, output_tokens)
    }
}

#[async_trait]
impl Provider for DeepSeekClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepSeek
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.stream_completion(request).await
    }
}

fn finish(text: String, input_tokens: u32, output_tokens: u32) -> Result<Completion, ProviderError> {
    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(Completion {
        provider: ProviderKind::DeepSeek,
        text,
        input_tokens,
        output_tokens,
    })
}

// ---------------------------------------------------------------------------
// SSE JSON parsing helpers
// ---------------------------------------------------------------------------

/// The parts of a streamed chunk we care about.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Chunk {
    pub content: Option<String>,
    pub usage: Option<(u32, u32)>,
}

/// Parse one streamed chunk.
///
/// Expected shape: `{ "choices": [ { "delta": { "content": "..." } } ],
/// "usage": { "prompt_tokens": N, "completion_tokens": M } }` where `usage`
/// only appears on the final chunk.
pub(crate) fn parse_chunk(data: &str) -> Option<Chunk> {
    let v: Value = serde_json::from_str(data).ok()?;
    let content = v
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let usage = v.get("usage").and_then(|u| {
        let input = u.get("prompt_tokens")?.as_u64()? as u32;
        let output = u.get("completion_tokens")?.as_u64()? as u32;
        Some((input, output))
    });
    Some(Chunk { content, usage })
}

async fn into_provider_error(err: reqwest_eventsource::Error) -> ProviderError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            ProviderError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            }
        }
        reqwest_eventsource::Error::Transport(e) => ProviderError::Transport(e.to_string()),
        other => ProviderError::Malformed(other.to_string()),
    }
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
            model: "deepseek-chat".into(),
            timeout_secs: 5,
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "You classify AI systems.".into(),
            user: "Classify this CV screening tool.".into(),
            max_tokens: 256,
            temperature: 0.2,
            search_query: None,
        }
    }

    #[test]
    fn parse_chunk_with_content() {
        let data = r#"{"id":"1","choices":[{"index":0,"delta":{"content":"High"}}]}"#;
        assert_eq!(
            parse_chunk(data),
            Some(Chunk {
                content: Some("High".into()),
                usage: None
            })
        );
    }

    #[test]
    fn parse_chunk_with_usage_only() {
        let data = r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":34}}"#;
        assert_eq!(
            parse_chunk(data),
            Some(Chunk {
                content: None,
                usage: Some((12, 34))
            })
        );
    }

    #[test]
    fn parse_chunk_role_delta_has_no_content() {
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_chunk(data), Some(Chunk::default()));
    }

    #[test]
    fn parse_chunk_invalid_json() {
        assert_eq!(parse_chunk("{broken"), None);
    }

    #[tokio::test]
    async fn empty_api_key_is_not_configured() {
        let client = DeepSeekClient::new(String::new(), &endpoint("http://127.0.0.1:9".into()))
            .unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
    }

    #[tokio::test]
    async fn mock_sse_server_full_flow() {
        let response = mock_http::sse_response(&[
            r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#,
            r#"{"choices":[{"delta":{"content":"{\"risk_level\":"}}]}"#,
            r#"{"choices":[{"delta":{"content":" \"high\"}"}}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":40,"completion_tokens":9}}"#,
            "[DONE]",
        ]);
        let (addr, server) = mock_http::serve(vec![response]).await;

        let client = DeepSeekClient::new("sk-test".into(), &endpoint(format!("http://{addr}")))
            .unwrap();
        let completion = client.complete(&request()).await.expect("stream should succeed");

        assert_eq!(completion.provider, ProviderKind::DeepSeek);
        assert_eq!(completion.text, "{\"risk_level\": \"high\"}");
        assert_eq!(completion.input_tokens, 40);
        assert_eq!(completion.output_tokens, 9);

        let requests = server.await.unwrap();
        let sent = &requests[0];
        assert!(sent.starts_with("POST /chat/completions"));
        assert!(sent.to_lowercase().contains("authorization: bearer sk-test"));
        assert!(sent.contains("\"stream\":true"));
        assert!(sent.contains("Classify this CV screening tool."));
    }

    #[tokio::test]
    async fn mock_server_error_status() {
        let response = mock_http::json_response(
            "401 Unauthorized",
            r#"{"error":{"message":"Authentication Fails","type":"authentication_error"}}"#,
        );
        let (addr, server) = mock_http::serve(vec![response]).await;

        let client = DeepSeekClient::new("sk-bad".into(), &endpoint(format!("http://{addr}")))
            .unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("Authentication Fails"));
            }
            other => panic!("expected Status error, got: {other:?}"),
        }
        let _ = server.await;
    }

    #[tokio::test]
    async fn stream_without_content_is_empty_response() {
        let response = mock_http::sse_response(&[
            r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
            "[DONE]",
        ]);
        let (addr, server) = mock_http::serve(vec![response]).await;

        let client = DeepSeekClient::new("sk-test".into(), &endpoint(format!("http://{addr}")))
            .unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
        let _ = server.await;
    }
}
