// Outbound model and search providers, the fallback chain that tries them in
// priority order, and the heuristics that turn free-form model output into a
// structured analysis.

pub mod chain;
pub mod deepseek;
pub mod gemini;
pub mod parse;
pub mod provider;
pub mod search;

#[cfg(test)]
pub(crate) mod mock_http;

pub use chain::{ChainError, ChainEvent, ProviderChain};
pub use provider::{Completion, CompletionRequest, Provider, ProviderError, ProviderKind};
