use serde::Deserialize;
use tracing::warn;

use super::{ProviderAdapter, decode, non_empty};
use crate::event::NormalizedEvent;
use crate::model::ProviderKind;
use crate::usage::Usage;

/// Anthropic Messages API stream events.
pub struct AnthropicAdapter;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessagesEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockStart {
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        delta: BlockDelta,
    },
    ContentBlockStop {},
    MessageDelta {
        #[serde(default)]
        delta: Option<MessageDeltaBody>,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop {},
    Ping {},
    Error {
        #[serde(default)]
        error: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn adapt(&self, raw: &serde_json::Value) -> Vec<NormalizedEvent> {
        let Some(event) = decode::<MessagesEvent>(self.kind(), raw) else {
            return Vec::new();
        };
        match event {
            // message_start carries the prompt count; output counts there are
            // provisional and superseded by message_delta.
            MessagesEvent::MessageStart { message } => message
                .usage
                .map(|usage| {
                    vec![NormalizedEvent::UsageReport(Usage::from_counts(
                        usage.input_tokens,
                        None,
                        None,
                    ))]
                })
                .unwrap_or_default(),
            MessagesEvent::ContentBlockStart { content_block } => match content_block {
                ContentBlock::Text { text } => non_empty(text)
                    .map(|text| vec![NormalizedEvent::text(text)])
                    .unwrap_or_default(),
                ContentBlock::ToolUse { id, name } => {
                    vec![NormalizedEvent::tool_open(Some(&id), &name)]
                }
                ContentBlock::Other => Vec::new(),
            },
            MessagesEvent::ContentBlockDelta { delta } => match delta {
                BlockDelta::TextDelta { text } if !text.is_empty() => {
                    vec![NormalizedEvent::text(text)]
                }
                BlockDelta::InputJsonDelta { partial_json } if !partial_json.is_empty() => {
                    vec![NormalizedEvent::tool_delta(None, partial_json)]
                }
                _ => Vec::new(),
            },
            MessagesEvent::MessageDelta { delta, usage } => {
                let mut events = Vec::new();
                if let Some(usage) = usage {
                    events.push(NormalizedEvent::UsageReport(Usage::from_counts(
                        None,
                        usage.output_tokens,
                        None,
                    )));
                }
                if delta.and_then(|d| d.stop_reason).is_some() {
                    events.push(NormalizedEvent::TurnEnd);
                }
                events
            }
            MessagesEvent::MessageStop {} => vec![NormalizedEvent::TurnEnd],
            MessagesEvent::Error { error } => {
                warn!(provider = %self.kind(), error = %error, "error event in stream");
                Vec::new()
            }
            MessagesEvent::ContentBlockStop {} | MessagesEvent::Ping {} | MessagesEvent::Unknown => {
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_tool_use_stream_maps_in_order() {
        let frames = [
            json!({"type":"message_start","message":{"id":"msg_1","role":"assistant","content":[],"usage":{"input_tokens":25,"output_tokens":1}}}),
            json!({"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}),
            json!({"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Checking"}}),
            json!({"type":"content_block_stop","index":0}),
            json!({"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"get_weather-invoke","input":{}}}),
            json!({"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"city\":"}}),
            json!({"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"Paris\"}"}}),
            json!({"type":"content_block_stop","index":1}),
            json!({"type":"message_delta","delta":{"stop_reason":"tool_use","stop_sequence":null},"usage":{"output_tokens":40}}),
            json!({"type":"message_stop"}),
        ];
        let events: Vec<NormalizedEvent> =
            frames.iter().flat_map(|f| AnthropicAdapter.adapt(f)).collect();

        assert_eq!(events[0], NormalizedEvent::UsageReport(Usage::new(25, 0, 25)));
        assert_eq!(events[1], NormalizedEvent::text("Checking"));
        let NormalizedEvent::ToolCallOpen { id, name } = &events[2] else {
            panic!("expected tool open, got {:?}", events[2]);
        };
        assert_eq!(id, "toolu_1");
        assert_eq!(name.plugin_key, "get_weather");
        assert_eq!(events[3], NormalizedEvent::tool_delta(None, "{\"city\":"));
        assert_eq!(events[4], NormalizedEvent::tool_delta(None, "\"Paris\"}"));
        assert_eq!(events[5], NormalizedEvent::UsageReport(Usage::new(0, 40, 40)));
        assert_eq!(events[6], NormalizedEvent::TurnEnd);
        assert_eq!(events[7], NormalizedEvent::TurnEnd);
        assert_eq!(events.len(), 8);
    }

    #[test]
    fn ping_thinking_and_unknown_events_are_silent() {
        for raw in [
            json!({"type":"ping"}),
            json!({"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}),
            json!({"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}),
            json!({"type":"brand_new_event","payload":1}),
            json!({"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}),
        ] {
            assert!(AnthropicAdapter.adapt(&raw).is_empty(), "{raw}");
        }
    }

    #[test]
    fn message_delta_without_stop_only_reports_usage() {
        let raw = json!({"type":"message_delta","delta":{},"usage":{"output_tokens":7}});
        assert_eq!(
            AnthropicAdapter.adapt(&raw),
            vec![NormalizedEvent::UsageReport(Usage::new(0, 7, 7))]
        );
    }
}
