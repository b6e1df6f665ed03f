use std::pin::Pin;

use crate::errors::GatewayError;
use crate::history::ChatMessage;
use crate::model::ProviderKind;
use crate::plugin::ToolDefinition;

/// Raw vendor chunks for one inner call, in arrival order.
pub type RawChunkStream =
    Pin<Box<dyn futures::Stream<Item = Result<serde_json::Value, GatewayError>> + Send + 'static>>;

/// Opaque execution settings (temperature, top_p, ...) passed through to the vendor.
pub type ExecutionSettings = serde_json::Map<String, serde_json::Value>;

/// Everything a chat model client needs to start one inner call.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub turn_id: uuid::Uuid,
    /// 1-based inner call number within the turn.
    pub iteration: u32,
    pub provider: ProviderKind,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub settings: ExecutionSettings,
    /// Always false from the controller: the model may propose calls but the
    /// client must not execute them.
    pub auto_invoke_tools: bool,
}

/// Vendor client that opens a streaming chat completion.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn stream_chat(&self, request: ChatRequest) -> Result<RawChunkStream, GatewayError>;
}
