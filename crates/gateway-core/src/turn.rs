use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::adapters::{ProviderAdapter, adapter_for};
use crate::client::{ChatModel, ChatRequest, ExecutionSettings};
use crate::config::{ToolFailurePolicy, TurnOptions};
use crate::errors::GatewayError;
use crate::gateway::GatewayInner;
use crate::history::{ChatMessage, ConversationHistory, ToolCallRequest};
use crate::model::{ModelRef, ProviderKind};
use crate::orchestrator::{
    InnerCallOutcome, InnerCallReport, ItemSink, drive_inner_call, is_cancelled, wait_cancelled,
};
use crate::output::{
    FINISH_MAX_ITERATIONS, FINISH_STOP, FINISH_TOOL_CALLS, OutputItem, SegmentSnapshot,
    TurnSummary,
};
use crate::plugin::{EnabledPlugin, PluginDirectory, PluginInvoker};
use crate::usage::{Usage, UsageAggregator};

/// Handle used to request cancellation of a running turn.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The consumer stops receiving items at once; the turn task stops at its
    /// next chunk boundary or before its next tool invocation.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Builder for one user turn: history, enabled plugins, settings and options.
pub struct TurnBuilder {
    gateway: Arc<GatewayInner>,
    model: ModelRef,
    history: ConversationHistory,
    plugins: Vec<EnabledPlugin>,
    settings: ExecutionSettings,
    options: TurnOptions,
}

impl TurnBuilder {
    pub(crate) fn new(gateway: Arc<GatewayInner>, model: ModelRef, options: TurnOptions) -> Self {
        Self {
            gateway,
            model,
            history: ConversationHistory::new(),
            plugins: Vec::new(),
            settings: ExecutionSettings::new(),
            options,
        }
    }

    /// Replaces the conversation history sent on the first inner call.
    pub fn history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    pub fn system_prompt(mut self, text: impl Into<String>) -> Self {
        self.history.push(ChatMessage::System {
            content: text.into(),
        });
        self
    }

    pub fn user_text(mut self, text: impl Into<String>) -> Self {
        self.history.push(ChatMessage::User {
            content: text.into(),
        });
        self
    }

    /// Enables one plugin for this turn.
    pub fn plugin(mut self, plugin: EnabledPlugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn plugins(mut self, plugins: impl IntoIterator<Item = EnabledPlugin>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Replaces the execution settings passed through to the vendor.
    pub fn settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    pub fn options(mut self, options: TurnOptions) -> Self {
        self.options = options;
        self
    }

    /// Caps the number of inner calls; `None` removes the cap.
    pub fn max_iterations(mut self, max_iterations: Option<u32>) -> Self {
        self.options.max_iterations = max_iterations;
        self
    }

    pub fn tool_failure_policy(mut self, policy: ToolFailurePolicy) -> Self {
        self.options.tool_failure_policy = policy;
        self
    }

    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.stream_buffer_capacity = capacity;
        self
    }

    /// Validates the builder and starts the tool-call loop.
    ///
    /// An unknown provider identity fails here, before any item is produced.
    pub async fn start_stream(self) -> Result<TurnStream, GatewayError> {
        let task = self.into_task()?;
        Ok(launch(task, TurnMode::ToolLoop))
    }

    /// Runs exactly one inner call without executing proposed tool calls.
    ///
    /// The stream ends with that call's own summary.
    pub async fn start_single_call(self) -> Result<TurnStream, GatewayError> {
        let task = self.into_task()?;
        Ok(launch(task, TurnMode::SingleCall))
    }

    /// Runs the turn to completion and returns the aggregate summary.
    pub async fn collect_summary(self) -> Result<TurnSummary, GatewayError> {
        self.start_stream().await?.finish().await
    }

    /// Runs the turn to completion and returns the final answer text.
    pub async fn collect_text(self) -> Result<String, GatewayError> {
        Ok(self.collect_summary().await?.text)
    }

    fn into_task(self) -> Result<TurnTask, GatewayError> {
        let provider = self.model.provider_kind()?;
        if self.model.model.trim().is_empty() {
            return Err(GatewayError::Validation("model must not be empty".into()));
        }
        self.options.validate()?;
        if self.history.is_empty() {
            return Err(GatewayError::Validation(
                "at least one message is required".into(),
            ));
        }
        let chat_model = self
            .gateway
            .chat_model(provider)
            .ok_or(GatewayError::ProviderNotRegistered { provider })?;

        Ok(TurnTask {
            turn_id: uuid::Uuid::new_v4(),
            provider,
            model: self.model.model,
            chat_model,
            adapter: adapter_for(provider),
            invoker: self.gateway.invoker.clone(),
            plugins: Arc::new(PluginDirectory::from_plugins(&self.plugins)),
            history: self.history,
            settings: self.settings,
            options: self.options,
        })
    }
}

#[derive(Clone, Copy, Debug)]
enum TurnMode {
    ToolLoop,
    SingleCall,
}

fn launch(task: TurnTask, mode: TurnMode) -> TurnStream {
    let (tx, rx) = mpsc::channel(task.options.stream_buffer_capacity);
    let (final_tx, final_rx) = oneshot::channel();
    let (abort_tx, abort_rx) = watch::channel(false);

    let turn_id = task.turn_id;
    let provider = task.provider;
    let model = task.model.clone();
    tokio::spawn(run_task(task, mode, tx, final_tx, abort_rx.clone()));

    TurnStream {
        turn_id,
        provider,
        model,
        rx,
        final_rx,
        abort_handle: AbortHandle { tx: abort_tx },
        abort_rx,
        saw_summary: false,
    }
}

/// Streaming handle returned by [`TurnBuilder::start_stream`].
///
/// Use `next_item()` to consume items as they arrive and `finish()` to obtain
/// the aggregate summary. Dropping the stream cancels the turn.
pub struct TurnStream {
    turn_id: uuid::Uuid,
    provider: ProviderKind,
    model: String,
    rx: mpsc::Receiver<OutputItem>,
    final_rx: oneshot::Receiver<Result<TurnSummary, GatewayError>>,
    abort_handle: AbortHandle,
    abort_rx: watch::Receiver<bool>,
    saw_summary: bool,
}

impl TurnStream {
    pub fn turn_id(&self) -> uuid::Uuid {
        self.turn_id
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        is_cancelled(&self.abort_rx)
    }

    /// Waits for the next output item.
    ///
    /// Returns `None` after the summary, after a fatal error, or as soon as
    /// cancellation has been requested.
    pub async fn next_item(&mut self) -> Option<OutputItem> {
        if self.saw_summary || self.is_cancelled() {
            return None;
        }
        let item = tokio::select! {
            biased;
            true = wait_cancelled(&mut self.abort_rx) => None,
            item = self.rx.recv() => item,
        };
        if let Some(OutputItem::Summary(_)) = &item {
            self.saw_summary = true;
        }
        item
    }

    /// Drains the stream (if needed) and returns the turn result.
    ///
    /// Returns `GatewayError::Cancelled` once cancellation has been requested.
    pub async fn finish(mut self) -> Result<TurnSummary, GatewayError> {
        if self.is_cancelled() {
            self.rx.close();
            return Err(GatewayError::Cancelled);
        }
        while !self.saw_summary {
            match self.rx.recv().await {
                Some(OutputItem::Summary(_)) => self.saw_summary = true,
                Some(_) => {}
                None => break,
            }
        }

        match (&mut self.final_rx).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::protocol_msg(format!(
                "turn task ended without final result (provider={}, model={})",
                self.provider, self.model
            ))),
        }
    }
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

/// Awaits `fut` unless the turn is cancelled first.
async fn unless_cancelled<F: Future>(
    abort: &mut watch::Receiver<bool>,
    fut: F,
) -> Result<F::Output, GatewayError> {
    tokio::select! {
        biased;
        true = wait_cancelled(abort) => Err(GatewayError::Cancelled),
        output = fut => Ok(output),
    }
}

/// State owned by one running turn.
struct TurnTask {
    turn_id: uuid::Uuid,
    provider: ProviderKind,
    model: String,
    chat_model: Arc<dyn ChatModel>,
    adapter: &'static dyn ProviderAdapter,
    invoker: Arc<dyn PluginInvoker>,
    plugins: Arc<PluginDirectory>,
    history: ConversationHistory,
    settings: ExecutionSettings,
    options: TurnOptions,
}

async fn run_task(
    task: TurnTask,
    mode: TurnMode,
    tx: mpsc::Sender<OutputItem>,
    final_tx: oneshot::Sender<Result<TurnSummary, GatewayError>>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let turn_id = task.turn_id;
    let provider = task.provider;
    let sink = ItemSink::new(tx, abort_rx.clone());
    info!(event = "turn.started", turn_id = %turn_id, provider = %provider, model = %task.model, mode = ?mode);

    let result = match mode {
        TurnMode::ToolLoop => task.run_loop(&sink, &mut abort_rx).await,
        TurnMode::SingleCall => task.run_single(&sink, &mut abort_rx).await,
    };
    match &result {
        Ok(summary) => info!(
            event = "turn.completed",
            turn_id = %turn_id,
            provider = %provider,
            finish_reason = %summary.finish_reason,
            prompt_tokens = summary.usage.prompt_tokens,
            completion_tokens = summary.usage.completion_tokens,
            total_tokens = summary.usage.total_tokens
        ),
        Err(GatewayError::Cancelled) => {
            info!(event = "turn.cancelled", turn_id = %turn_id, provider = %provider)
        }
        Err(err) => warn!(event = "turn.failed", turn_id = %turn_id, provider = %provider, error = %err),
    }
    let _ = final_tx.send(result);
}

impl TurnTask {
    async fn run_single(
        self,
        sink: &ItemSink,
        abort: &mut watch::Receiver<bool>,
    ) -> Result<TurnSummary, GatewayError> {
        let mut usage = UsageAggregator::new();
        let report = self.inner_call(1, &mut usage, sink, abort).await?;
        emit_summary(report.summary, sink, abort).await
    }

    async fn run_loop(
        mut self,
        sink: &ItemSink,
        abort: &mut watch::Receiver<bool>,
    ) -> Result<TurnSummary, GatewayError> {
        let mut usage = UsageAggregator::new();
        let mut segments: Vec<SegmentSnapshot> = Vec::new();
        let mut iteration = 0_u32;

        loop {
            iteration = iteration.saturating_add(1);
            let report = self.inner_call(iteration, &mut usage, sink, abort).await?;
            let first_new = segments.len();
            segments.extend(report.summary.segments);

            if report.tool_calls.is_empty() {
                let summary = aggregate(FINISH_STOP, report.summary.text, usage.total(), segments);
                return emit_summary(summary, sink, abort).await;
            }
            if self
                .options
                .max_iterations
                .is_some_and(|max| iteration >= max)
            {
                warn!(
                    event = "turn.max_iterations_reached",
                    turn_id = %self.turn_id,
                    iteration,
                    pending_calls = report.tool_calls.len()
                );
                let summary = aggregate(
                    FINISH_MAX_ITERATIONS,
                    report.summary.text,
                    usage.total(),
                    segments,
                );
                return emit_summary(summary, sink, abort).await;
            }

            self.history
                .record_tool_call_intent(report.tool_calls.clone());
            let slots: Vec<usize> = (first_new..segments.len())
                .filter(|&index| segments[index].tool_call.is_some())
                .collect();
            for (call, slot) in report.tool_calls.into_iter().zip(slots) {
                let result = self.execute_tool_call(&call, sink, abort).await?;
                if let Some(block) = segments[slot].tool_call.as_mut() {
                    block.result_json = Some(result.clone());
                }
                self.history
                    .record_tool_result(call.call_id, call.function_name, result);
            }
        }
    }

    async fn inner_call(
        &self,
        iteration: u32,
        usage: &mut UsageAggregator,
        sink: &ItemSink,
        abort: &mut watch::Receiver<bool>,
    ) -> Result<InnerCallReport, GatewayError> {
        let request = ChatRequest {
            turn_id: self.turn_id,
            iteration,
            provider: self.provider,
            model: self.model.clone(),
            messages: self.history.messages().to_vec(),
            tools: self.plugins.tools().to_vec(),
            settings: self.settings.clone(),
            auto_invoke_tools: false,
        };
        debug!(
            event = "turn.inner_call_started",
            turn_id = %self.turn_id,
            provider = %self.provider,
            iteration,
            messages = request.messages.len()
        );
        let chunks = unless_cancelled(abort, self.chat_model.stream_chat(request)).await??;
        match drive_inner_call(
            self.adapter,
            chunks,
            self.plugins.clone(),
            usage,
            sink,
            abort,
        )
        .await?
        {
            InnerCallOutcome::Completed(report) => {
                debug!(
                    event = "turn.inner_call_finished",
                    turn_id = %self.turn_id,
                    iteration,
                    tool_calls = report.tool_calls.len()
                );
                Ok(report)
            }
            InnerCallOutcome::Stopped => Err(GatewayError::Cancelled),
        }
    }

    /// Executes one proposed call and returns the content fed back to the model.
    async fn execute_tool_call(
        &self,
        call: &ToolCallRequest,
        sink: &ItemSink,
        abort: &mut watch::Receiver<bool>,
    ) -> Result<String, GatewayError> {
        if is_cancelled(abort) {
            return Err(GatewayError::Cancelled);
        }
        let invocation_id = uuid::Uuid::new_v4();
        let requested = OutputItem::ToolCallRequested {
            invocation_id,
            call_id: call.call_id.clone(),
            function_name: call.function_name.clone(),
            arguments: call.arguments.clone(),
            finish_reason: FINISH_TOOL_CALLS.to_string(),
        };
        if !sink.forward(requested).await {
            return Err(GatewayError::Cancelled);
        }
        info!(
            event = "turn.tool_call_started",
            turn_id = %self.turn_id,
            call_id = %call.call_id,
            function_name = %call.function_name,
            invocation_id = %invocation_id
        );

        let invoked = unless_cancelled(
            abort,
            self.invoker
                .invoke(&call.call_id, &call.function_name, &call.arguments),
        )
        .await?;
        let (result, error) = match invoked {
            Ok(result) => (result, None),
            Err(err) => {
                warn!(
                    event = "turn.tool_call_failed",
                    turn_id = %self.turn_id,
                    call_id = %call.call_id,
                    function_name = %call.function_name,
                    policy = ?self.options.tool_failure_policy,
                    error = %err
                );
                match self.options.tool_failure_policy {
                    ToolFailurePolicy::Abort => {
                        return Err(GatewayError::tool_invocation(
                            &call.call_id,
                            &call.function_name,
                            &err,
                        ));
                    }
                    ToolFailurePolicy::ReportToModel => {
                        let message = err.to_string();
                        let content = serde_json::json!({ "error": message }).to_string();
                        (content, Some(message))
                    }
                }
            }
        };

        let completed = OutputItem::ToolCallCompleted {
            invocation_id,
            call_id: call.call_id.clone(),
            function_name: call.function_name.clone(),
            result: result.clone(),
            error,
        };
        if !sink.forward(completed).await {
            return Err(GatewayError::Cancelled);
        }
        Ok(result)
    }
}

fn aggregate(
    finish_reason: &str,
    text: String,
    usage: Usage,
    segments: Vec<SegmentSnapshot>,
) -> TurnSummary {
    TurnSummary {
        finish_reason: finish_reason.to_string(),
        usage,
        text,
        segments,
    }
}

async fn emit_summary(
    summary: TurnSummary,
    sink: &ItemSink,
    abort: &watch::Receiver<bool>,
) -> Result<TurnSummary, GatewayError> {
    if is_cancelled(abort) || !sink.forward(OutputItem::Summary(summary.clone())).await {
        return Err(GatewayError::Cancelled);
    }
    Ok(summary)
}
