use crate::usage::Usage;

/// Where a tool function is served from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PluginType {
    /// Knowledge-base lookup functions (`wiki_*`).
    WikiPlugin,
    /// Every other function.
    NativePlugin,
}

/// Function name as proposed by the model, plus the plugin identity derived from it.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolName {
    /// Name exactly as the vendor reported it.
    pub function_name: String,
    /// Function name with a trailing `_invoke`/`-invoke` removed.
    pub plugin_key: String,
    pub plugin_type: PluginType,
}

impl ToolName {
    /// Normalizes a vendor function name.
    pub fn parse(function_name: &str) -> Self {
        Self {
            function_name: function_name.to_string(),
            plugin_key: plugin_key(function_name).to_string(),
            plugin_type: plugin_type(function_name),
        }
    }
}

const WIKI_PREFIX: &str = "wiki_";
const INVOKE_SUFFIX_LEN: usize = "_invoke".len();

/// `WikiPlugin` when the name starts with `wiki_` (any case).
pub fn plugin_type(function_name: &str) -> PluginType {
    let is_wiki = function_name
        .get(..WIKI_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(WIKI_PREFIX));
    if is_wiki {
        PluginType::WikiPlugin
    } else {
        PluginType::NativePlugin
    }
}

/// Strips one trailing `_invoke` or `-invoke` (any case).
pub fn plugin_key(function_name: &str) -> &str {
    let Some(split) = function_name.len().checked_sub(INVOKE_SUFFIX_LEN) else {
        return function_name;
    };
    let Some(suffix) = function_name.get(split..) else {
        return function_name;
    };
    let word = suffix
        .strip_prefix('_')
        .or_else(|| suffix.strip_prefix('-'));
    if word.is_some_and(|word| word.eq_ignore_ascii_case("invoke")) {
        &function_name[..split]
    } else {
        function_name
    }
}

/// Provider-agnostic event produced by an adapter from one raw chunk.
#[derive(Clone, Debug, PartialEq)]
pub enum NormalizedEvent {
    TextDelta {
        text: String,
    },
    ToolCallOpen {
        /// Vendor call id, empty when the vendor never supplies one.
        id: String,
        name: ToolName,
    },
    ToolCallDelta {
        id: String,
        /// Raw argument fragment; concatenated in arrival order.
        arguments: String,
    },
    /// Usage increment; added to whatever the call already reported.
    UsageReport(Usage),
    /// Running total for the current call; replaces the previous snapshot.
    UsageSnapshot(Usage),
    TurnEnd,
}

impl NormalizedEvent {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub(crate) fn tool_open(id: Option<&str>, function_name: &str) -> Self {
        Self::ToolCallOpen {
            id: id.unwrap_or_default().to_string(),
            name: ToolName::parse(function_name),
        }
    }

    pub(crate) fn tool_delta(id: Option<&str>, arguments: impl Into<String>) -> Self {
        Self::ToolCallDelta {
            id: id.unwrap_or_default().to_string(),
            arguments: arguments.into(),
        }
    }
}
