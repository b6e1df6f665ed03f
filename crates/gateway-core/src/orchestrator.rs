use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::adapters::ProviderAdapter;
use crate::client::RawChunkStream;
use crate::errors::GatewayError;
use crate::event::NormalizedEvent;
use crate::history::ToolCallRequest;
use crate::output::{FINISH_STOP, OutputItem, TurnSummary};
use crate::plugin::PluginDirectory;
use crate::segment::SegmentMachine;
use crate::usage::UsageAggregator;

/// Forwards output items to the consumer as soon as they are produced.
pub(crate) struct ItemSink {
    tx: mpsc::Sender<OutputItem>,
    abort: watch::Receiver<bool>,
}

impl ItemSink {
    pub(crate) fn new(tx: mpsc::Sender<OutputItem>, abort: watch::Receiver<bool>) -> Self {
        Self { tx, abort }
    }

    /// Returns false once the consumer is gone or the turn is cancelled,
    /// including while waiting for room in a full buffer.
    pub(crate) async fn forward(&self, item: OutputItem) -> bool {
        let mut abort = self.abort.clone();
        tokio::select! {
            biased;
            true = wait_cancelled(&mut abort) => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    pub(crate) async fn forward_all(&self, items: Vec<OutputItem>) -> bool {
        for item in items {
            if !self.forward(item).await {
                return false;
            }
        }
        true
    }
}

/// What one inner call produced.
#[derive(Debug)]
pub(crate) struct InnerCallReport {
    /// Summary of this call only: its segments, text and usage share.
    pub summary: TurnSummary,
    /// Calls built from `ToolCallOpen`/`ToolCallDelta` events, in order.
    pub tool_calls: Vec<ToolCallRequest>,
}

#[derive(Debug)]
pub(crate) enum InnerCallOutcome {
    Completed(InnerCallReport),
    /// Cancellation observed or consumer dropped; nothing more is forwarded.
    Stopped,
}

pub(crate) fn is_cancelled(abort: &watch::Receiver<bool>) -> bool {
    *abort.borrow()
}

/// Resolves to true once cancellation is requested; false if it never can be.
pub(crate) async fn wait_cancelled(abort: &mut watch::Receiver<bool>) -> bool {
    loop {
        if *abort.borrow_and_update() {
            return true;
        }
        if abort.changed().await.is_err() {
            return false;
        }
    }
}

/// Drives one inner call's chunk stream through the adapter and segment machine.
///
/// Every update is forwarded before the next chunk is awaited. At exhaustion
/// the open segment is force-closed and the call is summarized; usage
/// reports are recorded into the turn-wide aggregator.
pub(crate) async fn drive_inner_call(
    adapter: &dyn ProviderAdapter,
    mut chunks: RawChunkStream,
    plugins: Arc<PluginDirectory>,
    usage: &mut UsageAggregator,
    sink: &ItemSink,
    abort: &mut watch::Receiver<bool>,
) -> Result<InnerCallOutcome, GatewayError> {
    let usage_mark = usage.begin_call();
    let mut machine = SegmentMachine::new(plugins);
    let mut watching_abort = true;
    let mut chunk_count = 0_u64;

    loop {
        if is_cancelled(abort) {
            debug!(provider = %adapter.kind(), chunk_count, "inner call cancelled");
            return Ok(InnerCallOutcome::Stopped);
        }
        let next = tokio::select! {
            changed = abort.changed(), if watching_abort => {
                if changed.is_err() {
                    watching_abort = false;
                }
                continue;
            }
            next = chunks.next() => next,
        };

        match next {
            Some(Ok(raw)) => {
                chunk_count = chunk_count.saturating_add(1);
                for event in adapter.adapt(&raw) {
                    let items = match event {
                        NormalizedEvent::UsageReport(report) => {
                            usage.record(report);
                            continue;
                        }
                        NormalizedEvent::UsageSnapshot(report) => {
                            usage.record_snapshot(report);
                            continue;
                        }
                        other => machine.apply(other),
                    };
                    if !sink.forward_all(items).await {
                        return Ok(InnerCallOutcome::Stopped);
                    }
                }
            }
            Some(Err(err)) => {
                warn!(provider = %adapter.kind(), chunk_count, error = %err, "upstream chunk stream failed");
                let _ = sink.forward_all(machine.fail()).await;
                return Err(err);
            }
            None => break,
        }
    }

    if !sink.forward_all(machine.finish()).await {
        return Ok(InnerCallOutcome::Stopped);
    }
    let segments = machine.snapshots();
    let summary = TurnSummary {
        finish_reason: FINISH_STOP.to_string(),
        usage: usage.total_since(usage_mark),
        text: TurnSummary::text_of(&segments),
        segments,
    };
    debug!(
        provider = %adapter.kind(),
        chunk_count,
        segments = summary.segments.len(),
        "inner call drained"
    );
    Ok(InnerCallOutcome::Completed(InnerCallReport {
        tool_calls: machine.tool_calls(),
        summary,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::adapter_for;
    use crate::model::ProviderKind;
    use crate::output::{SegmentPayload, SegmentState};
    use crate::usage::Usage;
    use futures::stream;
    use serde_json::json;

    fn openai_text(text: &str) -> serde_json::Value {
        json!({"choices":[{"index":0,"delta":{"content":text},"finish_reason":null}]})
    }

    fn chunks(items: Vec<Result<serde_json::Value, GatewayError>>) -> RawChunkStream {
        Box::pin(stream::iter(items))
    }

    async fn drive(
        raw: Vec<Result<serde_json::Value, GatewayError>>,
    ) -> (Result<InnerCallOutcome, GatewayError>, Vec<OutputItem>, UsageAggregator) {
        let (tx, mut rx) = mpsc::channel(64);
        let (_abort_tx, mut abort_rx) = watch::channel(false);
        let mut usage = UsageAggregator::new();
        let sink = ItemSink::new(tx, abort_rx.clone());
        let outcome = drive_inner_call(
            adapter_for(ProviderKind::OpenAi),
            chunks(raw),
            Arc::new(PluginDirectory::default()),
            &mut usage,
            &sink,
            &mut abort_rx,
        )
        .await;
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        (outcome, items, usage)
    }

    #[tokio::test]
    async fn text_only_call_forces_end_and_summarizes() {
        let (outcome, items, _) = drive(vec![
            Ok(openai_text("Hello")),
            Ok(openai_text(" world")),
            Ok(json!({"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]})),
        ])
        .await;

        let states: Vec<(SegmentState, SegmentPayload)> = items
            .iter()
            .filter_map(OutputItem::as_segment)
            .map(|u| (u.state, u.payload.clone()))
            .collect();
        assert_eq!(
            states,
            vec![
                (SegmentState::Start, SegmentPayload::Text("Hello".into())),
                (SegmentState::Processing, SegmentPayload::Text(" world".into())),
                (SegmentState::End, SegmentPayload::None),
            ]
        );
        let Ok(InnerCallOutcome::Completed(report)) = outcome else {
            panic!("expected completed call, got {outcome:?}");
        };
        assert_eq!(report.summary.finish_reason, "stop");
        assert_eq!(report.summary.text, "Hello world");
        assert!(report.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn exhaustion_without_stop_signal_still_ends_once() {
        let (outcome, items, _) = drive(vec![Ok(openai_text("partial"))]).await;
        let ends = items
            .iter()
            .filter_map(OutputItem::as_segment)
            .filter(|u| u.state == SegmentState::End)
            .count();
        assert_eq!(ends, 1);
        assert!(matches!(outcome, Ok(InnerCallOutcome::Completed(_))));
    }

    #[tokio::test]
    async fn mismatched_chunk_changes_nothing() {
        let (outcome, items, usage) = drive(vec![Ok(json!({"choices": "garbage"}))]).await;
        assert!(items.is_empty());
        assert!(usage.is_empty());
        let Ok(InnerCallOutcome::Completed(report)) = outcome else {
            panic!("expected completed call");
        };
        assert!(report.summary.segments.is_empty());
    }

    #[tokio::test]
    async fn usage_is_summed_per_call() {
        let (outcome, _, usage) = drive(vec![
            Ok(json!({"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":0,"total_tokens":10}})),
            Ok(openai_text("x")),
            Ok(json!({"choices":[],"usage":{"prompt_tokens":0,"completion_tokens":5,"total_tokens":5}})),
        ])
        .await;
        let Ok(InnerCallOutcome::Completed(report)) = outcome else {
            panic!("expected completed call");
        };
        assert_eq!(report.summary.usage, Usage::new(10, 5, 15));
        assert_eq!(usage.len(), 2);
    }

    #[tokio::test]
    async fn upstream_error_moves_open_segment_to_error() {
        let (outcome, items, _) = drive(vec![
            Ok(openai_text("half")),
            Err(GatewayError::transport(ProviderKind::OpenAi, "connection reset")),
        ])
        .await;
        assert!(matches!(outcome, Err(GatewayError::Transport { .. })));
        let last = items.last().and_then(OutputItem::as_segment).expect("segment");
        assert_eq!(last.state, SegmentState::Error);
    }

    #[tokio::test]
    async fn cancellation_before_first_chunk_stops_without_output() {
        let (tx, mut rx) = mpsc::channel(8);
        let (abort_tx, mut abort_rx) = watch::channel(false);
        abort_tx.send(true).expect("abort");
        let mut usage = UsageAggregator::new();
        let sink = ItemSink::new(tx, abort_rx.clone());
        let outcome = drive_inner_call(
            adapter_for(ProviderKind::OpenAi),
            chunks(vec![Ok(openai_text("never"))]),
            Arc::new(PluginDirectory::default()),
            &mut usage,
            &sink,
            &mut abort_rx,
        )
        .await;
        assert!(matches!(outcome, Ok(InnerCallOutcome::Stopped)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancellation_while_waiting_for_a_chunk_stops() {
        let (tx, _rx) = mpsc::channel(8);
        let (abort_tx, mut abort_rx) = watch::channel(false);
        let mut usage = UsageAggregator::new();
        let pending: RawChunkStream = Box::pin(stream::pending());
        let sink = ItemSink::new(tx, abort_rx.clone());
        let drive = drive_inner_call(
            adapter_for(ProviderKind::OpenAi),
            pending,
            Arc::new(PluginDirectory::default()),
            &mut usage,
            &sink,
            &mut abort_rx,
        );
        let abort = async {
            tokio::task::yield_now().await;
            abort_tx.send(true).expect("abort");
        };
        let (outcome, ()) = tokio::join!(drive, abort);
        assert!(matches!(outcome, Ok(InnerCallOutcome::Stopped)));
    }

    #[tokio::test]
    async fn cancellation_releases_a_call_blocked_on_a_full_buffer() {
        let (tx, mut rx) = mpsc::channel(1);
        let (abort_tx, mut abort_rx) = watch::channel(false);
        let mut usage = UsageAggregator::new();
        let sink = ItemSink::new(tx, abort_rx.clone());
        let drive = drive_inner_call(
            adapter_for(ProviderKind::OpenAi),
            chunks(vec![Ok(openai_text("a")), Ok(openai_text("b")), Ok(openai_text("c"))]),
            Arc::new(PluginDirectory::default()),
            &mut usage,
            &sink,
            &mut abort_rx,
        );
        let abort = async {
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            abort_tx.send(true).expect("abort");
        };
        let (outcome, ()) = tokio::join!(drive, abort);
        assert!(matches!(outcome, Ok(InnerCallOutcome::Stopped)));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
