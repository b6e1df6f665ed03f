//! Common imports for typical gateway usage.
pub use crate::{
    AbortHandle, ChatModel, ConversationHistory, EnabledPlugin, Gateway, GatewayError,
    ModelRef, OutputItem, PluginError, PluginInvoker, ProviderKind, SegmentPayload,
    SegmentState, SegmentUpdate, ToolDefinition, TurnStream, TurnSummary,
};
