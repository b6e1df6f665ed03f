use std::time::Duration;

use crate::errors::GatewayError;
use crate::model::ProviderKind;

/// Request/response dialect spoken by the upstream endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WireFormat {
    /// OpenAI-style `chat/completions` with server-sent events.
    ChatCompletions,
    /// Ollama's native `/api/chat` with newline-delimited JSON.
    OllamaChat,
}

impl WireFormat {
    fn serves(&self, provider: ProviderKind) -> bool {
        match self {
            Self::ChatCompletions => {
                matches!(provider, ProviderKind::OpenAi | ProviderKind::AzureOpenAi)
            }
            Self::OllamaChat => provider == ProviderKind::Ollama,
        }
    }
}

/// Configuration for [`super::HttpChatModel`].
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    /// Adapter used to read the responses.
    pub provider: ProviderKind,
    pub wire_format: WireFormat,
    pub base_url: String,
    /// Request path, including any query string.
    pub path: String,
    pub api_key: Option<String>,
    /// Header carrying the key; `None` sends it as a bearer token.
    pub api_key_header: Option<String>,
    /// Default HTTP timeout for requests.
    pub timeout: Duration,
}

impl HttpClientConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            wire_format: WireFormat::ChatCompletions,
            base_url: "https://api.openai.com".to_string(),
            path: "/v1/chat/completions".to_string(),
            api_key: Some(api_key.into()),
            api_key_header: None,
            timeout: Duration::from_secs(120),
        }
    }

    /// Builds an OpenAI config from `OPENAI_API_KEY`.
    pub fn openai_from_env() -> Result<Self, GatewayError> {
        Ok(Self::openai(required_env("OPENAI_API_KEY")?))
    }

    /// Azure OpenAI deployment at `endpoint` (for example `https://res.openai.azure.com`).
    pub fn azure_openai(
        endpoint: impl Into<String>,
        deployment: &str,
        api_version: &str,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            provider: ProviderKind::AzureOpenAi,
            wire_format: WireFormat::ChatCompletions,
            base_url: endpoint.into(),
            path: format!(
                "/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
            ),
            api_key: Some(api_key.into()),
            api_key_header: Some("api-key".to_string()),
            timeout: Duration::from_secs(120),
        }
    }

    /// Local Ollama server; no key required.
    pub fn ollama(base_url: impl Into<String>) -> Self {
        Self {
            provider: ProviderKind::Ollama,
            wire_format: WireFormat::OllamaChat,
            base_url: base_url.into(),
            path: "/api/chat".to_string(),
            api_key: None,
            api_key_header: None,
            timeout: Duration::from_secs(300),
        }
    }

    /// Reads the API key from `var`.
    pub fn api_key_from_env(mut self, var: &str) -> Result<Self, GatewayError> {
        self.api_key = Some(required_env(var)?);
        Ok(self)
    }

    /// Overrides the API base URL (for proxies or test servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Overrides the default HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.base_url.trim().is_empty() {
            return Err(GatewayError::Config("base_url must not be empty".into()));
        }
        if !self.wire_format.serves(self.provider) {
            return Err(GatewayError::Config(format!(
                "wire format {:?} cannot serve provider {}",
                self.wire_format, self.provider
            )));
        }
        if let Some(key) = &self.api_key
            && key.trim().is_empty()
        {
            return Err(GatewayError::Config(format!(
                "api_key for {} must not be empty",
                self.provider
            )));
        }
        Ok(())
    }

    pub(crate) fn endpoint_url(&self) -> String {
        let path = self.path.trim_start_matches('/');
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

fn required_env(var: &str) -> Result<String, GatewayError> {
    let value = std::env::var(var).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(GatewayError::Config(format!("missing {var}")));
    }
    Ok(value)
}
