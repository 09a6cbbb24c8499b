// Ordered fallback over providers: the first provider that produces a
// non-blank answer wins, failures are recorded and the next one is tried.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use aiact_core::config::Config;

use crate::deepseek::DeepSeekClient;
use crate::gemini::GeminiClient;
use crate::provider::{Completion, CompletionRequest, Provider, ProviderError, ProviderKind};
use crate::search::GoogleSearchClient;

/// Progress notifications emitted while the chain runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainEvent {
    Attempt { provider: ProviderKind },
    Failed { provider: ProviderKind, message: String },
    Succeeded { provider: ProviderKind },
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("all providers failed ({})", summarize(.failures))]
    Exhausted {
        failures: Vec<(ProviderKind, String)>,
    },
}

fn summarize(failures: &[(ProviderKind, String)]) -> String {
    if failures.is_empty() {
        return "none configured".to_string();
    }
    failures
        .iter()
        .map(|(kind, msg)| format!("{kind}: {msg}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct ProviderChain {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Self {
        Self { providers }
    }

    /// Build the chain in `analysis.provider_order`, skipping providers whose
    /// credentials are missing.
    pub fn from_config(config: &Config) -> Self {
        let creds = &config.credentials;
        let mut providers: Vec<Box<dyn Provider>> = Vec::new();

        for name in &config.analysis.provider_order {
            let Some(kind) = ProviderKind::from_config_name(name) else {
                warn!("unknown provider `{name}` in provider_order, skipping");
                continue;
            };
            let built: Result<Box<dyn Provider>, ProviderError> = match kind {
                ProviderKind::DeepSeek => match &creds.deepseek_api_key {
                    Some(key) => DeepSeekClient::new(key.clone(), &config.deepseek)
                        .map(|c| Box::new(c) as Box<dyn Provider>),
                    None => Err(ProviderError::NotConfigured),
                },
                ProviderKind::Gemini => match &creds.gemini_api_key {
                    Some(key) => GeminiClient::new(key.clone(), &config.gemini)
                        .map(|c| Box::new(c) as Box<dyn Provider>),
                    None => Err(ProviderError::NotConfigured),
                },
                ProviderKind::GoogleSearch => {
                    match (&creds.google_api_key, &creds.google_search_engine_id) {
                        (Some(key), Some(cx)) => {
                            GoogleSearchClient::new(key.clone(), cx.clone(), &config.google_search)
                                .map(|c| Box::new(c) as Box<dyn Provider>)
                        }
                        _ => Err(ProviderError::NotConfigured),
                    }
                }
            };
            match built {
                Ok(provider) => {
                    info!("{kind} enabled");
                    providers.push(provider);
                }
                Err(ProviderError::NotConfigured) => info!("{kind} disabled (no credentials)"),
                Err(e) => warn!("{kind} disabled: {e}"),
            }
        }

        Self { providers }
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Try each provider in order and return the first non-blank completion.
    ///
    /// `events`, when given, receives an `Attempt` before each call and a
    /// `Failed` or `Succeeded` after it. A closed receiver does not stop the
    /// chain.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        events: Option<&mpsc::Sender<ChainEvent>>,
    ) -> Result<Completion, ChainError> {
        let mut failures = Vec::new();

        for provider in &self.providers {
            let kind = provider.kind();
            notify(events, ChainEvent::Attempt { provider: kind }).await;

            let outcome = match provider.complete(request).await {
                Ok(c) if c.text.trim().is_empty() => Err(ProviderError::EmptyResponse),
                other => other,
            };

            match outcome {
                Ok(completion) => {
                    info!(
                        provider = %kind,
                        input_tokens = completion.input_tokens,
                        output_tokens = completion.output_tokens,
                        "completion succeeded"
                    );
                    notify(events, ChainEvent::Succeeded { provider: kind }).await;
                    return Ok(completion);
                }
                Err(e) => {
                    warn!(provider = %kind, "completion failed: {e}");
                    let message = e.to_string();
                    notify(
                        events,
                        ChainEvent::Failed {
                            provider: kind,
                            message: message.clone(),
                        },
                    )
                    .await;
                    failures.push((kind, message));
                }
            }
        }

        Err(ChainError::Exhausted { failures })
    }
}

async fn notify(events: Option<&mpsc::Sender<ChainEvent>>, event: ChainEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
