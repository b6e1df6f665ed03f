use std::collections::HashMap;

use crate::errors::PluginError;

/// Function schema advertised to the model.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    /// Function name as the model will see it (for example `wiki_search_invoke`).
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A plugin enabled for one request.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EnabledPlugin {
    /// Key matched against normalized function names.
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub functions: Vec<ToolDefinition>,
}

impl EnabledPlugin {
    pub fn new(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            functions: Vec::new(),
        }
    }

    pub fn function(mut self, definition: ToolDefinition) -> Self {
        self.functions.push(definition);
        self
    }
}

/// Per-request lookup from plugin key to display name, plus the tool list.
///
/// Built once when the turn starts and shared read-only by every inner call.
#[derive(Clone, Debug, Default)]
pub struct PluginDirectory {
    names: HashMap<String, String>,
    tools: Vec<ToolDefinition>,
}

impl PluginDirectory {
    pub fn from_plugins(plugins: &[EnabledPlugin]) -> Self {
        let mut names = HashMap::with_capacity(plugins.len());
        let mut tools = Vec::new();
        for plugin in plugins {
            names.insert(plugin.key.clone(), plugin.display_name.clone());
            tools.extend(plugin.functions.iter().cloned());
        }
        Self { names, tools }
    }

    /// Display name for a plugin key; falls back to the key itself.
    pub fn display_name(&self, plugin_key: &str) -> String {
        self.names
            .get(plugin_key)
            .cloned()
            .unwrap_or_else(|| plugin_key.to_string())
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Plugin runtime that executes tool calls on behalf of the controller.
#[async_trait::async_trait]
pub trait PluginInvoker: Send + Sync {
    /// Executes one call and returns its result serialized as a string (usually JSON).
    async fn invoke(
        &self,
        call_id: &str,
        function_name: &str,
        arguments: &str,
    ) -> Result<String, PluginError>;
}
