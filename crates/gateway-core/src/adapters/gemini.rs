use serde::Deserialize;

use super::{ProviderAdapter, decode, non_empty};
use crate::event::NormalizedEvent;
use crate::model::ProviderKind;
use crate::usage::Usage;

/// Gemini `streamGenerateContent` responses.
pub struct GeminiAdapter;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u64>,
    #[serde(default)]
    candidates_token_count: Option<u64>,
    #[serde(default)]
    total_token_count: Option<u64>,
}

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn adapt(&self, raw: &serde_json::Value) -> Vec<NormalizedEvent> {
        let Some(chunk) = decode::<GenerateContentChunk>(self.kind(), raw) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let mut finished = false;
        for candidate in chunk.candidates {
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                if let Some(call) = part.function_call {
                    // Gemini sends each call whole, so it opens and completes in one chunk.
                    let id = call.id.as_deref().filter(|id| !id.is_empty());
                    let arguments = if call.args.is_null() {
                        "{}".to_string()
                    } else {
                        call.args.to_string()
                    };
                    events.push(NormalizedEvent::tool_open(id, &call.name));
                    events.push(NormalizedEvent::tool_delta(id, arguments));
                    continue;
                }
                if part.thought {
                    continue;
                }
                if let Some(text) = non_empty(part.text) {
                    events.push(NormalizedEvent::text(text));
                }
            }
            finished |= candidate.finish_reason.is_some();
        }
        // usageMetadata is a running total and may trail the finishReason chunk.
        if let Some(usage) = chunk.usage_metadata {
            events.push(NormalizedEvent::UsageSnapshot(Usage::from_counts(
                usage.prompt_token_count,
                usage.candidates_token_count,
                usage.total_token_count,
            )));
        }
        if finished {
            events.push(NormalizedEvent::TurnEnd);
        }
        events
    }
}
