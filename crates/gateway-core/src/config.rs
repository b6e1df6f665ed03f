use crate::errors::GatewayError;
use crate::model::ModelRef;

/// What to do when a proposed tool call fails to execute.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailurePolicy {
    /// Abort the whole turn with `GatewayError::ToolInvocation`.
    #[default]
    Abort,
    /// Report the failure as the tool result and keep going.
    ReportToModel,
}

/// Per-turn behavior options.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TurnOptions {
    /// Maximum number of inner model calls; `None` removes the cap.
    pub max_iterations: Option<u32>,
    /// Bounded item buffer between the turn task and the consumer.
    pub stream_buffer_capacity: usize,
    pub tool_failure_policy: ToolFailurePolicy,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            max_iterations: Some(16),
            stream_buffer_capacity: 128,
            tool_failure_policy: ToolFailurePolicy::default(),
        }
    }
}

impl TurnOptions {
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.stream_buffer_capacity == 0 {
            return Err(GatewayError::Validation(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        if self.max_iterations == Some(0) {
            return Err(GatewayError::Validation(
                "max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Gateway-level defaults, typically loaded once at startup.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GatewayConfig {
    /// Provider identity string; validated when a turn starts.
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub options: TurnOptions,
}

impl GatewayConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            options: TurnOptions::default(),
        }
    }

    /// Loads `GATEWAY_PROVIDER`, `GATEWAY_MODEL` and optionally `GATEWAY_MAX_ITERATIONS`
    /// (`0` or `none` disables the cap).
    pub fn from_env() -> Result<Self, GatewayError> {
        let provider = required_env("GATEWAY_PROVIDER")?;
        let model = required_env("GATEWAY_MODEL")?;
        let mut config = Self::new(provider, model);
        if let Ok(raw) = std::env::var("GATEWAY_MAX_ITERATIONS") {
            config.options.max_iterations = parse_max_iterations(&raw)?;
        }
        Ok(config)
    }

    pub fn model_ref(&self) -> ModelRef {
        ModelRef::new(self.provider.clone(), self.model.clone())
    }
}

fn required_env(key: &str) -> Result<String, GatewayError> {
    let value = std::env::var(key).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(GatewayError::Config(format!("missing {key}")));
    }
    Ok(value.trim().to_string())
}

fn parse_max_iterations(raw: &str) -> Result<Option<u32>, GatewayError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    match raw.parse::<u32>() {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(e) => Err(GatewayError::Config(format!(
            "invalid GATEWAY_MAX_ITERATIONS {raw:?}: {e}"
        ))),
    }
}
