use std::fmt;
use std::str::FromStr;

use crate::errors::GatewayError;

/// Backend families the gateway can normalize.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    AzureOpenAi,
    Anthropic,
    Gemini,
    Ollama,
    DashScope,
}

impl ProviderKind {
    /// All supported kinds, in registration order.
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::OpenAi,
        ProviderKind::AzureOpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
        ProviderKind::Ollama,
        ProviderKind::DashScope,
    ];

    /// Canonical identity string (for example `azure_openai`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
            Self::DashScope => "dashscope",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure_openai" | "azureopenai" | "azure" => Ok(Self::AzureOpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            "dashscope" | "qwen" => Ok(Self::DashScope),
            _ => Err(GatewayError::UnsupportedProvider {
                provider: value.to_string(),
            }),
        }
    }
}

/// Model selection for a turn.
///
/// The provider is kept as the raw identity string so an unknown backend is
/// reported when the turn starts rather than when the reference is built.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelRef {
    /// Provider identity (for example `openai` or `dashscope`).
    pub provider: String,
    /// Provider-specific model name.
    pub model: String,
}

impl ModelRef {
    /// Creates a model reference.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Resolves the provider identity to a supported kind.
    pub fn provider_kind(&self) -> Result<ProviderKind, GatewayError> {
        self.provider.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!("OpenAI".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert_eq!(
            "azure-openai".parse::<ProviderKind>(),
            Ok(ProviderKind::AzureOpenAi)
        );
        assert_eq!("qwen".parse::<ProviderKind>(), Ok(ProviderKind::DashScope));
    }

    #[test]
    fn canonical_names_round_trip() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>(), Ok(kind));
        }
    }

    #[test]
    fn unknown_identity_is_unsupported() {
        let err = ModelRef::new("mistery-llm", "m").provider_kind().unwrap_err();
        assert_eq!(
            err,
            GatewayError::UnsupportedProvider {
                provider: "mistery-llm".into()
            }
        );
    }
}
