use std::collections::HashMap;
use std::sync::Arc;

use crate::client::ChatModel;
use crate::config::{GatewayConfig, TurnOptions};
use crate::errors::{GatewayError, PluginError};
use crate::model::{ModelRef, ProviderKind};
use crate::plugin::PluginInvoker;
use crate::turn::TurnBuilder;

pub(crate) struct GatewayInner {
    models: HashMap<ProviderKind, Arc<dyn ChatModel>>,
    pub(crate) invoker: Arc<dyn PluginInvoker>,
    pub(crate) defaults: TurnOptions,
}

impl GatewayInner {
    pub(crate) fn chat_model(&self, kind: ProviderKind) -> Option<Arc<dyn ChatModel>> {
        self.models.get(&kind).cloned()
    }
}

/// Entry point for starting turns against registered chat models.
#[derive(Clone)]
pub struct Gateway {
    pub(crate) inner: Arc<GatewayInner>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    /// Starts configuring one turn against `model`.
    pub fn turn(&self, model: ModelRef) -> TurnBuilder {
        TurnBuilder::new(self.inner.clone(), model, self.inner.defaults.clone())
    }

    /// Starts a turn using the provider, model and options of `config`.
    pub fn turn_from_config(&self, config: &GatewayConfig) -> TurnBuilder {
        TurnBuilder::new(self.inner.clone(), config.model_ref(), config.options.clone())
    }

    /// Provider kinds with a registered client.
    pub fn providers(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.inner.models.contains_key(kind))
            .collect()
    }
}

/// Registers chat model clients and the plugin runtime before building a [`Gateway`].
#[derive(Default)]
pub struct GatewayBuilder {
    models: Vec<(ProviderKind, Arc<dyn ChatModel>)>,
    invoker: Option<Arc<dyn PluginInvoker>>,
    defaults: TurnOptions,
}

impl GatewayBuilder {
    /// Registers the client used for every turn routed to `kind`.
    ///
    /// One client per provider kind; duplicates are rejected by [`Self::build`].
    pub fn register_model(mut self, kind: ProviderKind, model: Arc<dyn ChatModel>) -> Self {
        self.models.push((kind, model));
        self
    }

    /// Sets the runtime that executes model-proposed tool calls.
    ///
    /// Without one, every proposed call fails with `PluginError::UnknownFunction`.
    pub fn plugin_invoker(mut self, invoker: Arc<dyn PluginInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Default options applied to turns started with [`Gateway::turn`].
    pub fn turn_options(mut self, options: TurnOptions) -> Self {
        self.defaults = options;
        self
    }

    pub fn build(self) -> Result<Gateway, GatewayError> {
        self.defaults.validate()?;
        let mut models: HashMap<ProviderKind, Arc<dyn ChatModel>> = HashMap::new();
        for (kind, model) in self.models {
            if models.insert(kind, model).is_some() {
                return Err(GatewayError::Config(format!(
                    "duplicate chat model registration: {kind}"
                )));
            }
        }
        Ok(Gateway {
            inner: Arc::new(GatewayInner {
                models,
                invoker: self.invoker.unwrap_or_else(|| Arc::new(NoPlugins)),
                defaults: self.defaults,
            }),
        })
    }
}

struct NoPlugins;

#[async_trait::async_trait]
impl PluginInvoker for NoPlugins {
    async fn invoke(
        &self,
        _call_id: &str,
        function_name: &str,
        _arguments: &str,
    ) -> Result<String, PluginError> {
        Err(PluginError::UnknownFunction(function_name.to_string()))
    }
}
