/// A tool call the model asked for, as recorded in the history.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub function_name: String,
    /// Raw JSON arguments exactly as streamed by the model.
    pub arguments: String,
}

/// One message of the conversation sent to the model.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    System { content: String },
    User { content: String },
    Assistant { content: String },
    /// The assistant's own tool-call intent.
    AssistantToolCalls { calls: Vec<ToolCallRequest> },
    /// Result of one tool call.
    Tool {
        call_id: String,
        function_name: String,
        content: String,
    },
}

/// Ordered message list owned by a single request.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.push(ChatMessage::System {
            content: content.into(),
        });
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.push(ChatMessage::User {
            content: content.into(),
        });
        self
    }

    pub fn assistant(mut self, content: impl Into<String>) -> Self {
        self.push(ChatMessage::Assistant {
            content: content.into(),
        });
        self
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Records the assistant's tool-call intent ahead of the tool results.
    ///
    /// Chat APIs reject a `tool` message whose call id was not first announced
    /// by an assistant message in the same conversation, so this must be
    /// appended once per batch before any [`Self::record_tool_result`].
    pub fn record_tool_call_intent(&mut self, calls: Vec<ToolCallRequest>) {
        self.push(ChatMessage::AssistantToolCalls { calls });
    }

    pub fn record_tool_result(
        &mut self,
        call_id: impl Into<String>,
        function_name: impl Into<String>,
        content: impl Into<String>,
    ) {
        self.push(ChatMessage::Tool {
            call_id: call_id.into(),
            function_name: function_name.into(),
            content: content.into(),
        });
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl From<Vec<ChatMessage>> for ConversationHistory {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }
}
