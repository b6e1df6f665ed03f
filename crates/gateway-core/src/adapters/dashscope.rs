use serde::Deserialize;

use super::{ProviderAdapter, decode, non_empty};
use crate::event::NormalizedEvent;
use crate::model::ProviderKind;
use crate::usage::Usage;

/// DashScope (Qwen) native generation API with `incremental_output` and
/// `result_format: message`.
pub struct DashScopeAdapter;

#[derive(Debug, Deserialize)]
struct GenerationChunk {
    #[serde(default)]
    output: Option<GenerationOutput>,
    #[serde(default)]
    usage: Option<GenerationUsage>,
}

#[derive(Debug, Deserialize)]
struct GenerationOutput {
    #[serde(default)]
    choices: Vec<GenerationChoice>,
    /// Present when `result_format` is `text`.
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationChoice {
    #[serde(default)]
    message: Option<GenerationMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationMessage {
    /// A string for chat models, an array of parts for multimodal ones.
    #[serde(default)]
    content: serde_json::Value,
    #[serde(default)]
    tool_calls: Option<Vec<GenerationToolCall>>,
}

#[derive(Debug, Deserialize)]
struct GenerationToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<GenerationFunction>,
}

#[derive(Debug, Deserialize)]
struct GenerationFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

/// DashScope spells "not finished" as JSON `null` or the string `"null"`.
fn is_finished(reason: Option<&str>) -> bool {
    reason.is_some_and(|r| !r.is_empty() && r != "null")
}

fn content_text(content: &serde_json::Value) -> Option<String> {
    match content {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Array(parts) => {
            let text: String = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect();
            Some(text)
        }
        _ => None,
    }
}

/// Pushes the events of each choice; true when any choice finished.
fn push_choices(choices: Vec<GenerationChoice>, events: &mut Vec<NormalizedEvent>) -> bool {
    let mut finished = false;
    for choice in choices {
        if let Some(message) = choice.message {
            if let Some(text) = non_empty(content_text(&message.content)) {
                events.push(NormalizedEvent::text(text));
            }
            for call in message.tool_calls.unwrap_or_default() {
                let Some(function) = call.function else {
                    continue;
                };
                let id = call.id.as_deref().filter(|id| !id.is_empty());
                if let Some(name) = non_empty(function.name) {
                    events.push(NormalizedEvent::tool_open(id, &name));
                }
                if let Some(arguments) = non_empty(function.arguments) {
                    events.push(NormalizedEvent::tool_delta(id, arguments));
                }
            }
        }
        finished |= is_finished(choice.finish_reason.as_deref());
    }
    finished
}

impl ProviderAdapter for DashScopeAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DashScope
    }

    fn adapt(&self, raw: &serde_json::Value) -> Vec<NormalizedEvent> {
        let Some(chunk) = decode::<GenerationChunk>(self.kind(), raw) else {
            return Vec::new();
        };
        let mut events = Vec::new();
        let mut finished = false;
        if let Some(output) = chunk.output {
            if let Some(text) = non_empty(output.text) {
                events.push(NormalizedEvent::text(text));
            }
            finished = push_choices(output.choices, &mut events)
                || is_finished(output.finish_reason.as_deref());
        }
        // usage is a running total and may trail the finishing chunk.
        if let Some(usage) = chunk.usage {
            events.push(NormalizedEvent::UsageSnapshot(Usage::from_counts(
                usage.input_tokens,
                usage.output_tokens,
                usage.total_tokens,
            )));
        }
        if finished {
            events.push(NormalizedEvent::TurnEnd);
        }
        events
    }
}
