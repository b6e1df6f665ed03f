use serde_json::{Map, Value, json};
use tracing::debug;

use super::config::WireFormat;
use crate::client::ChatRequest;
use crate::history::{ChatMessage, ToolCallRequest};
use crate::plugin::ToolDefinition;

const RESERVED_KEYS: [&str; 4] = ["model", "messages", "stream", "tools"];

/// Renders the streaming request body for one inner call.
pub(crate) fn build_request_body(request: &ChatRequest, format: WireFormat) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|message| render_message(message, format))
        .collect();

    let mut body = Map::new();
    body.insert("model".into(), json!(request.model));
    body.insert("messages".into(), Value::Array(messages));
    body.insert("stream".into(), json!(true));
    if format == WireFormat::ChatCompletions {
        body.insert("stream_options".into(), json!({ "include_usage": true }));
    }
    if !request.tools.is_empty() {
        let tools: Vec<Value> = request.tools.iter().map(render_tool).collect();
        body.insert("tools".into(), Value::Array(tools));
    }

    let mut settings = request.settings.clone();
    for key in RESERVED_KEYS {
        if settings.remove(key).is_some() {
            debug!(key, "ignoring execution setting that would override the request");
        }
    }
    match format {
        WireFormat::ChatCompletions => body.extend(settings),
        // Ollama reads sampling parameters from `options`.
        WireFormat::OllamaChat if !settings.is_empty() => {
            body.insert("options".into(), Value::Object(settings));
        }
        WireFormat::OllamaChat => {}
    }
    Value::Object(body)
}

fn render_message(message: &ChatMessage, format: WireFormat) -> Value {
    match message {
        ChatMessage::System { content } => json!({ "role": "system", "content": content }),
        ChatMessage::User { content } => json!({ "role": "user", "content": content }),
        ChatMessage::Assistant { content } => json!({ "role": "assistant", "content": content }),
        ChatMessage::AssistantToolCalls { calls } => {
            let calls: Vec<Value> = calls
                .iter()
                .map(|call| render_tool_call(call, format))
                .collect();
            match format {
                WireFormat::ChatCompletions => {
                    json!({ "role": "assistant", "content": null, "tool_calls": calls })
                }
                WireFormat::OllamaChat => {
                    json!({ "role": "assistant", "content": "", "tool_calls": calls })
                }
            }
        }
        ChatMessage::Tool {
            call_id,
            function_name,
            content,
        } => match format {
            WireFormat::ChatCompletions => json!({
                "role": "tool",
                "tool_call_id": call_id,
                "name": function_name,
                "content": content,
            }),
            WireFormat::OllamaChat => json!({
                "role": "tool",
                "tool_name": function_name,
                "content": content,
            }),
        },
    }
}

fn render_tool_call(call: &ToolCallRequest, format: WireFormat) -> Value {
    match format {
        WireFormat::ChatCompletions => json!({
            "id": call.call_id,
            "type": "function",
            "function": { "name": call.function_name, "arguments": call.arguments },
        }),
        WireFormat::OllamaChat => {
            // Ollama wants the arguments object, not its JSON text.
            let arguments = serde_json::from_str::<Value>(&call.arguments)
                .unwrap_or_else(|_| Value::String(call.arguments.clone()));
            json!({ "function": { "name": call.function_name, "arguments": arguments } })
        }
    }
}

fn render_tool(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ConversationHistory;
    use crate::model::ProviderKind;

    fn request() -> ChatRequest {
        let mut history = ConversationHistory::new().system("be brief").user("2+2?");
        history.record_tool_call_intent(vec![ToolCallRequest {
            call_id: "call_1".into(),
            function_name: "calculator_invoke".into(),
            arguments: r#"{"expr":"2+2"}"#.into(),
        }]);
        history.record_tool_result("call_1", "calculator_invoke", "4");

        let mut settings = serde_json::Map::new();
        settings.insert("temperature".into(), json!(0.1));
        settings.insert("stream".into(), json!(false));
        ChatRequest {
            turn_id: uuid::Uuid::new_v4(),
            iteration: 2,
            provider: ProviderKind::OpenAi,
            model: "gpt-4o-mini".into(),
            messages: history.messages().to_vec(),
            tools: vec![ToolDefinition::new(
                "calculator_invoke",
                "Evaluate arithmetic",
                json!({"type":"object"}),
            )],
            settings,
            auto_invoke_tools: false,
        }
    }

    #[test]
    fn chat_completions_body_carries_tool_round_trip() {
        let body = build_request_body(&request(), WireFormat::ChatCompletions);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["tools"][0]["function"]["name"], "calculator_invoke");

        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            r#"{"expr":"2+2"}"#
        );
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn ollama_body_nests_settings_and_parses_arguments() {
        let body = build_request_body(&request(), WireFormat::OllamaChat);
        assert!(body.get("stream_options").is_none());
        assert!(body.get("temperature").is_none());
        assert_eq!(body["options"]["temperature"], 0.1);
        assert_eq!(body["stream"], true);
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"]["expr"], "2+2");
        assert_eq!(messages[3]["tool_name"], "calculator_invoke");
    }
}
