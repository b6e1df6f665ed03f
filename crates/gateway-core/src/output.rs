use crate::event::PluginType;
use crate::usage::Usage;

/// Finish reason of a turn that ended with a plain answer.
pub const FINISH_STOP: &str = "stop";
/// Finish reason attached to tool-call announcements.
pub const FINISH_TOOL_CALLS: &str = "tool_calls";
/// Finish reason of a turn stopped by the iteration cap.
pub const FINISH_MAX_ITERATIONS: &str = "max_iterations";

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Text,
    ToolCall,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    Start,
    Processing,
    End,
    Error,
}

impl SegmentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End | Self::Error)
    }
}

/// Tool invocation captured by a tool-call segment.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCallBlock {
    pub call_id: String,
    pub plugin_key: String,
    /// Display name from the request's plugin directory.
    pub plugin_name: String,
    pub function_name: String,
    pub plugin_type: PluginType,
    /// Raw JSON arguments accumulated from deltas.
    pub arguments: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_json: Option<String>,
}

/// Payload carried by one segment update.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SegmentPayload {
    /// State-only notification.
    None,
    /// Text delta (the initial content on `Start`).
    Text(String),
    /// Tool call identity, sent on `Start` and `End`.
    ToolCall(ToolCallBlock),
}

/// Incremental update of one segment.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SegmentUpdate {
    /// Stable for every update of the same segment.
    pub segment_id: uuid::Uuid,
    pub kind: SegmentKind,
    pub state: SegmentState,
    pub payload: SegmentPayload,
}

/// Final view of a segment inside a summary.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SegmentSnapshot {
    pub segment_id: uuid::Uuid,
    pub kind: SegmentKind,
    pub state: SegmentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallBlock>,
}

/// Terminal item of an inner call or of a whole turn.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TurnSummary {
    pub finish_reason: String,
    pub usage: Usage,
    /// Concatenated text of the final inner call.
    pub text: String,
    pub segments: Vec<SegmentSnapshot>,
}

impl TurnSummary {
    /// Concatenates text segments in order.
    pub fn text_of(segments: &[SegmentSnapshot]) -> String {
        let mut out = String::new();
        for segment in segments {
            if let Some(text) = &segment.text {
                out.push_str(text);
            }
        }
        out
    }
}

/// One item of the public output sequence.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum OutputItem {
    Segment(SegmentUpdate),
    /// The controller is about to execute a proposed call.
    ToolCallRequested {
        invocation_id: uuid::Uuid,
        call_id: String,
        function_name: String,
        arguments: String,
        finish_reason: String,
    },
    /// Result of the call announced with the same `invocation_id`.
    ToolCallCompleted {
        invocation_id: uuid::Uuid,
        call_id: String,
        function_name: String,
        result: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Summary(TurnSummary),
}

impl OutputItem {
    pub fn as_segment(&self) -> Option<&SegmentUpdate> {
        match self {
            Self::Segment(update) => Some(update),
            _ => None,
        }
    }

    pub fn finish_reason(&self) -> Option<&str> {
        match self {
            Self::Summary(summary) => Some(&summary.finish_reason),
            Self::ToolCallRequested { finish_reason, .. } => Some(finish_reason),
            _ => None,
        }
    }
}
