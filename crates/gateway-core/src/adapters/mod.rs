//! Per-vendor translation from raw streaming chunks to [`NormalizedEvent`]s.
//!
//! Adapters are stateless: everything they know comes from the chunk in hand.
//! A chunk that does not have the expected shape produces no events.
mod anthropic;
mod dashscope;
mod gemini;
mod ollama;
mod openai;

use serde::de::DeserializeOwned;
use tracing::trace;

use crate::event::NormalizedEvent;
use crate::model::ProviderKind;

pub use anthropic::AnthropicAdapter;
pub use dashscope::DashScopeAdapter;
pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::{AzureOpenAiAdapter, OpenAiAdapter};

/// Pure translation from one vendor chunk to normalized events.
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Maps one raw chunk. Never fails; unrecognized payloads map to an empty list.
    fn adapt(&self, raw: &serde_json::Value) -> Vec<NormalizedEvent>;
}

static OPENAI: OpenAiAdapter = OpenAiAdapter;
static AZURE_OPENAI: AzureOpenAiAdapter = AzureOpenAiAdapter;
static ANTHROPIC: AnthropicAdapter = AnthropicAdapter;
static GEMINI: GeminiAdapter = GeminiAdapter;
static OLLAMA: OllamaAdapter = OllamaAdapter;
static DASHSCOPE: DashScopeAdapter = DashScopeAdapter;

/// Adapter for a provider kind. Resolve once per request.
pub fn adapter_for(kind: ProviderKind) -> &'static dyn ProviderAdapter {
    match kind {
        ProviderKind::OpenAi => &OPENAI,
        ProviderKind::AzureOpenAi => &AZURE_OPENAI,
        ProviderKind::Anthropic => &ANTHROPIC,
        ProviderKind::Gemini => &GEMINI,
        ProviderKind::Ollama => &OLLAMA,
        ProviderKind::DashScope => &DASHSCOPE,
    }
}

/// Deserializes a chunk into the vendor's shape, logging mismatches at trace level.
fn decode<T: DeserializeOwned>(kind: ProviderKind, raw: &serde_json::Value) -> Option<T> {
    match T::deserialize(raw) {
        Ok(chunk) => Some(chunk),
        Err(err) => {
            trace!(provider = %kind, error = %err, "chunk does not match adapter shape");
            None
        }
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.is_empty())
}
