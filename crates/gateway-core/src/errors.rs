use crate::model::ProviderKind;

/// Failure reported by the plugin runtime while executing one tool call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    /// No plugin function matches the requested name.
    #[error("unknown plugin function: {0}")]
    UnknownFunction(String),
    /// Arguments could not be decoded for the target function.
    #[error("invalid arguments for {function_name}: {message}")]
    InvalidArguments {
        function_name: String,
        message: String,
    },
    /// The plugin ran and failed.
    #[error("plugin execution failed: {0}")]
    Execution(String),
}

/// Top-level error type for the gateway API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Invalid gateway or client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input to the turn builder.
    #[error("validation error: {0}")]
    Validation(String),
    /// Provider identity matches none of the supported adapters.
    #[error("unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },
    /// Provider kind is supported but no chat model client was registered for it.
    #[error("no chat model registered for provider {provider}")]
    ProviderNotRegistered { provider: ProviderKind },
    /// Upstream returned an application-level failure (HTTP status, auth, quota).
    #[error("provider error ({provider}): {message}")]
    Provider {
        provider: ProviderKind,
        message: String,
        status_code: Option<u16>,
    },
    /// Upstream connection or chunk stream failed.
    #[error("transport error ({provider}): {message}")]
    Transport {
        provider: ProviderKind,
        message: String,
    },
    /// Executing a model-proposed tool call failed.
    #[error("tool call {call_id} ({function_name}) failed: {message}")]
    ToolInvocation {
        call_id: String,
        function_name: String,
        message: String,
    },
    /// The turn was cancelled through its `AbortHandle`.
    #[error("cancelled")]
    Cancelled,
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Creates a provider-level error.
    pub fn provider(
        provider: ProviderKind,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::Transport {
            provider,
            message: message.into(),
        }
    }

    pub(crate) fn tool_invocation(
        call_id: impl Into<String>,
        function_name: impl Into<String>,
        err: &PluginError,
    ) -> Self {
        Self::ToolInvocation {
            call_id: call_id.into(),
            function_name: function_name.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns true for failures raised by the upstream model connection.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Transport { .. })
    }
}
