use serde::Deserialize;

use super::{ProviderAdapter, decode, non_empty};
use crate::event::NormalizedEvent;
use crate::model::ProviderKind;
use crate::usage::Usage;

/// `chat.completion.chunk` frames from the Chat Completions API.
pub struct OpenAiAdapter;

/// Azure OpenAI deployments: same chunk shape as OpenAI, plus content-filter
/// preamble frames whose `choices` list is empty and choices without `delta`.
pub struct AzureOpenAiAdapter;

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Option<Vec<ChunkChoice>>,
    #[serde(default)]
    usage: Option<ChunkUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

fn map_chat_completion_chunk(kind: ProviderKind, raw: &serde_json::Value) -> Vec<NormalizedEvent> {
    let Some(chunk) = decode::<ChatCompletionChunk>(kind, raw) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    let mut finished = false;
    for choice in chunk.choices.unwrap_or_default() {
        if let Some(delta) = choice.delta {
            if let Some(text) = non_empty(delta.content) {
                events.push(NormalizedEvent::text(text));
            }
            for call in delta.tool_calls.unwrap_or_default() {
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
        finished |= choice.finish_reason.is_some();
    }
    if let Some(usage) = chunk.usage {
        events.push(NormalizedEvent::UsageReport(Usage::from_counts(
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens,
        )));
    }
    if finished {
        events.push(NormalizedEvent::TurnEnd);
    }
    events
}

impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn adapt(&self, raw: &serde_json::Value) -> Vec<NormalizedEvent> {
        map_chat_completion_chunk(self.kind(), raw)
    }
}

impl ProviderAdapter for AzureOpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AzureOpenAi
    }

    fn adapt(&self, raw: &serde_json::Value) -> Vec<NormalizedEvent> {
        map_chat_completion_chunk(self.kind(), raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PluginType;
    use serde_json::json;

    #[test]
    fn role_preamble_with_empty_content_is_skipped() {
        let raw = json!({"choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]});
        assert!(OpenAiAdapter.adapt(&raw).is_empty());
    }

    #[test]
    fn text_delta_maps_to_text_event() {
        let raw = json!({"choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]});
        assert_eq!(OpenAiAdapter.adapt(&raw), vec![NormalizedEvent::text("Hello")]);
    }

    #[test]
    fn streamed_tool_call_opens_then_deltas() {
        let first = json!({"choices":[{"index":0,"delta":{"tool_calls":[
            {"index":0,"id":"call_abc","type":"function","function":{"name":"wiki_search_invoke","arguments":""}}
        ]}}]});
        let second = json!({"choices":[{"index":0,"delta":{"tool_calls":[
            {"index":0,"function":{"arguments":"{\"q\":\"rust\"}"}}
        ]}}]});

        let opened = OpenAiAdapter.adapt(&first);
        assert_eq!(opened.len(), 1);
        let NormalizedEvent::ToolCallOpen { id, name } = &opened[0] else {
            panic!("expected open, got {opened:?}");
        };
        assert_eq!(id, "call_abc");
        assert_eq!(name.plugin_key, "wiki_search");
        assert_eq!(name.plugin_type, PluginType::WikiPlugin);

        assert_eq!(
            OpenAiAdapter.adapt(&second),
            vec![NormalizedEvent::tool_delta(None, "{\"q\":\"rust\"}")]
        );
    }

    #[test]
    fn finish_and_usage_in_either_order() {
        let finish = json!({"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]});
        assert_eq!(OpenAiAdapter.adapt(&finish), vec![NormalizedEvent::TurnEnd]);

        let usage_only = json!({"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}});
        assert_eq!(
            OpenAiAdapter.adapt(&usage_only),
            vec![NormalizedEvent::UsageReport(Usage::new(12, 3, 15))]
        );

        let both = json!({"choices":[{"delta":{"content":"!"},"finish_reason":"stop"}],"usage":{"prompt_tokens":1,"completion_tokens":1}});
        assert_eq!(
            OpenAiAdapter.adapt(&both),
            vec![
                NormalizedEvent::text("!"),
                NormalizedEvent::UsageReport(Usage::new(1, 1, 2)),
                NormalizedEvent::TurnEnd,
            ]
        );
    }

    #[test]
    fn null_usage_and_tool_calls_are_tolerated() {
        let raw = json!({"choices":[{"delta":{"content":"x","tool_calls":null}}],"usage":null});
        assert_eq!(OpenAiAdapter.adapt(&raw), vec![NormalizedEvent::text("x")]);
    }

    #[test]
    fn azure_content_filter_preamble_is_ignored() {
        let raw = json!({
            "choices": [],
            "prompt_filter_results": [{"prompt_index":0,"content_filter_results":{"hate":{"filtered":false,"severity":"safe"}}}]
        });
        assert!(AzureOpenAiAdapter.adapt(&raw).is_empty());
    }

    #[test]
    fn azure_choice_without_delta_still_finishes() {
        let raw = json!({"choices":[{"index":0,"finish_reason":"content_filter","content_filter_results":{}}]});
        assert_eq!(AzureOpenAiAdapter.adapt(&raw), vec![NormalizedEvent::TurnEnd]);
    }
}
