use serde::Deserialize;
use tracing::warn;

use super::{ProviderAdapter, decode};
use crate::event::NormalizedEvent;
use crate::model::ProviderKind;
use crate::usage::Usage;

/// Ollama `/api/chat` JSON-lines responses.
pub struct OllamaAdapter;

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    #[serde(default)]
    id: Option<String>,
    function: OllamaFunction,
}

#[derive(Debug, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

impl ProviderAdapter for OllamaAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn adapt(&self, raw: &serde_json::Value) -> Vec<NormalizedEvent> {
        let Some(chunk) = decode::<OllamaChunk>(self.kind(), raw) else {
            return Vec::new();
        };
        if let Some(error) = chunk.error {
            warn!(provider = %self.kind(), error = %error, "error line in stream");
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(message) = chunk.message {
            if !message.content.is_empty() {
                events.push(NormalizedEvent::text(message.content));
            }
            for call in message.tool_calls.unwrap_or_default() {
                let id = call.id.as_deref().filter(|id| !id.is_empty());
                let arguments = match call.function.arguments {
                    serde_json::Value::Null => "{}".to_string(),
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                };
                events.push(NormalizedEvent::tool_open(id, &call.function.name));
                events.push(NormalizedEvent::tool_delta(id, arguments));
            }
        }
        if chunk.done {
            if chunk.prompt_eval_count.is_some() || chunk.eval_count.is_some() {
                events.push(NormalizedEvent::UsageReport(Usage::from_counts(
                    chunk.prompt_eval_count,
                    chunk.eval_count,
                    None,
                )));
            }
            events.push(NormalizedEvent::TurnEnd);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_lines_then_done_with_usage() {
        let line = json!({"model":"llama3.2","message":{"role":"assistant","content":"Hi"},"done":false});
        assert_eq!(OllamaAdapter.adapt(&line), vec![NormalizedEvent::text("Hi")]);

        let done = json!({"model":"llama3.2","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop","prompt_eval_count":26,"eval_count":9});
        assert_eq!(
            OllamaAdapter.adapt(&done),
            vec![
                NormalizedEvent::UsageReport(Usage::new(26, 9, 35)),
                NormalizedEvent::TurnEnd,
            ]
        );
    }

    #[test]
    fn tool_calls_arrive_whole() {
        let line = json!({"message":{"role":"assistant","content":"","tool_calls":[
            {"function":{"name":"calculator","arguments":{"expr":"2+2"}}}
        ]},"done":false});
        let events = OllamaAdapter.adapt(&line);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], NormalizedEvent::ToolCallOpen { id, .. } if id.is_empty()));
        assert_eq!(events[1], NormalizedEvent::tool_delta(None, r#"{"expr":"2+2"}"#));
    }

    #[test]
    fn error_line_is_absorbed() {
        assert!(OllamaAdapter.adapt(&json!({"error":"model not found"})).is_empty());
    }
}
