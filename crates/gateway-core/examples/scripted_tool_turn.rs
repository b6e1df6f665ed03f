//! Offline tool round-trip against a scripted Anthropic-shaped model.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::stream;
use gateway_core::prelude::*;
use gateway_core::{ChatRequest, RawChunkStream};
use serde_json::{Value, json};

struct ScriptedClaude {
    rounds: Mutex<VecDeque<Vec<Value>>>,
}

#[async_trait::async_trait]
impl ChatModel for ScriptedClaude {
    async fn stream_chat(&self, request: ChatRequest) -> Result<RawChunkStream, GatewayError> {
        let round = self
            .rounds
            .lock()
            .map_err(|_| GatewayError::Protocol("script lock poisoned".into()))?
            .pop_front()
            .ok_or_else(|| GatewayError::Protocol(format!("no script for call {}", request.iteration)))?;
        Ok(Box::pin(stream::iter(round.into_iter().map(Ok))))
    }
}

struct Weather;

#[async_trait::async_trait]
impl PluginInvoker for Weather {
    async fn invoke(
        &self,
        _call_id: &str,
        function_name: &str,
        arguments: &str,
    ) -> Result<String, PluginError> {
        if function_name != "weather_invoke" {
            return Err(PluginError::UnknownFunction(function_name.to_string()));
        }
        let args: Value = serde_json::from_str(arguments).map_err(|e| PluginError::InvalidArguments {
            function_name: function_name.to_string(),
            message: e.to_string(),
        })?;
        Ok(json!({ "city": args["city"], "celsius": 4 }).to_string())
    }
}

fn rounds() -> VecDeque<Vec<Value>> {
    VecDeque::from([
        vec![
            json!({"type":"message_start","message":{"usage":{"input_tokens":42,"output_tokens":1}}}),
            json!({"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"weather_invoke","input":{}}}),
            json!({"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"city\":"}}),
            json!({"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"\"Oslo\"}"}}),
            json!({"type":"content_block_stop","index":0}),
            json!({"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":18}}),
            json!({"type":"message_stop"}),
        ],
        vec![
            json!({"type":"message_start","message":{"usage":{"input_tokens":80,"output_tokens":1}}}),
            json!({"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}),
            json!({"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"It is 4°C"}}),
            json!({"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" in Oslo."}}),
            json!({"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":9}}),
            json!({"type":"message_stop"}),
        ],
    ])
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), GatewayError> {
    gateway_core::init_observability();

    let gateway = Gateway::builder()
        .register_model(
            ProviderKind::Anthropic,
            Arc::new(ScriptedClaude {
                rounds: Mutex::new(rounds()),
            }),
        )
        .plugin_invoker(Arc::new(Weather))
        .build()?;

    let mut turn = gateway
        .turn(ModelRef::new("anthropic", "claude-sonnet"))
        .user_text("What's the weather in Oslo?")
        .plugin(EnabledPlugin::new("weather", "Weather").function(ToolDefinition::new(
            "weather_invoke",
            "Current weather for a city",
            json!({"type":"object","properties":{"city":{"type":"string"}},"required":["city"]}),
        )))
        .start_stream()
        .await?;

    while let Some(item) = turn.next_item().await {
        println!("{}", serde_json::to_string(&item).unwrap_or_default());
    }
    let summary = turn.finish().await?;
    println!("answer: {} ({} tokens)", summary.text, summary.usage.total_tokens);
    Ok(())
}
