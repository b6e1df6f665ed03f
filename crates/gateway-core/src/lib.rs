//! Streaming core of a multi-provider LLM gateway.
//!
//! Raw vendor chunks from six backends (OpenAI, Azure OpenAI, Anthropic,
//! Gemini, Ollama, DashScope) are normalized into one event vocabulary, folded
//! into segment updates (a text run or one tool call each), and streamed to
//! the caller while the gateway drives a manual tool-call loop: the model
//! proposes calls, the gateway executes them through a [`PluginInvoker`] and
//! feeds the results back until the model answers in plain text.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gateway_core::http::{HttpChatModel, HttpClientConfig};
//! use gateway_core::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), GatewayError> {
//! let model = HttpChatModel::new(HttpClientConfig::openai_from_env()?)?;
//! let gateway = Gateway::builder()
//!     .register_model(model.provider(), Arc::new(model))
//!     .build()?;
//!
//! let mut turn = gateway
//!     .turn(ModelRef::new("openai", "gpt-4o-mini"))
//!     .system_prompt("Answer briefly.")
//!     .user_text("Say hello")
//!     .start_stream()
//!     .await?;
//!
//! while let Some(item) = turn.next_item().await {
//!     if let Some(SegmentUpdate { payload: SegmentPayload::Text(text), .. }) = item.as_segment() {
//!         print!("{text}");
//!     }
//! }
//! let summary = turn.finish().await?;
//! println!("\n{} tokens", summary.usage.total_tokens);
//! # Ok(())
//! # }
//! ```

/// Per-vendor chunk adapters.
pub mod adapters;
/// Chat model client contract.
pub mod client;
/// Turn options and gateway configuration.
pub mod config;
/// Public error types.
pub mod errors;
/// Normalized events and tool-name normalization.
pub mod event;
/// Gateway entry point and builder.
pub mod gateway;
/// Conversation history sent to the model.
pub mod history;
/// Streaming HTTP chat client.
pub mod http;
/// Provider identities and model references.
pub mod model;
/// Process-wide tracing setup.
pub mod observability;
mod orchestrator;
/// Output items streamed to the caller.
pub mod output;
/// Enabled plugins and the plugin runtime contract.
pub mod plugin;
/// Common imports for typical usage.
pub mod prelude;
/// Segment state machine.
pub mod segment;
/// Turn builder, streaming handle, and the tool-call loop.
pub mod turn;
/// Token usage records and aggregation.
pub mod usage;

pub use adapters::{ProviderAdapter, adapter_for};
pub use client::{ChatModel, ChatRequest, ExecutionSettings, RawChunkStream};
pub use config::{GatewayConfig, ToolFailurePolicy, TurnOptions};
pub use errors::{GatewayError, PluginError};
pub use event::{NormalizedEvent, PluginType, ToolName};
pub use gateway::{Gateway, GatewayBuilder};
pub use history::{ChatMessage, ConversationHistory, ToolCallRequest};
pub use model::{ModelRef, ProviderKind};
pub use observability::init_observability;
pub use output::{
    OutputItem, SegmentKind, SegmentPayload, SegmentSnapshot, SegmentState, SegmentUpdate,
    ToolCallBlock, TurnSummary,
};
pub use plugin::{EnabledPlugin, PluginDirectory, PluginInvoker, ToolDefinition};
pub use segment::{Segment, SegmentMachine};
pub use turn::{AbortHandle, TurnBuilder, TurnStream};
pub use usage::{Usage, UsageAggregator};
