use std::sync::Arc;

use tracing::{debug, trace};

use crate::event::{NormalizedEvent, ToolName};
use crate::history::ToolCallRequest;
use crate::output::{
    OutputItem, SegmentKind, SegmentPayload, SegmentSnapshot, SegmentState, SegmentUpdate,
    ToolCallBlock,
};
use crate::plugin::PluginDirectory;

/// One contiguous unit of output of a single kind.
#[derive(Clone, Debug)]
pub struct Segment {
    id: uuid::Uuid,
    kind: SegmentKind,
    state: SegmentState,
    text: String,
    tool_call: Option<ToolCallBlock>,
    pushed: bool,
}

impl Segment {
    fn text(initial: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            kind: SegmentKind::Text,
            state: SegmentState::Start,
            text: initial,
            tool_call: None,
            pushed: false,
        }
    }

    fn tool_call(block: ToolCallBlock) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            kind: SegmentKind::ToolCall,
            state: SegmentState::Start,
            text: String::new(),
            tool_call: Some(block),
            pushed: false,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    /// True once the update for the current state has been emitted.
    pub fn pushed(&self) -> bool {
        self.pushed
    }

    pub fn is_open(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn tool_call_block(&self) -> Option<&ToolCallBlock> {
        self.tool_call.as_ref()
    }

    fn transition(&mut self, state: SegmentState) {
        self.state = state;
        self.pushed = false;
    }

    /// Emits the update for the current state, at most once per state change.
    fn emit(&mut self, payload: SegmentPayload) -> Option<OutputItem> {
        if self.pushed {
            return None;
        }
        self.pushed = true;
        Some(OutputItem::Segment(SegmentUpdate {
            segment_id: self.id,
            kind: self.kind,
            state: self.state,
            payload,
        }))
    }

    fn identity_payload(&self) -> SegmentPayload {
        match &self.tool_call {
            Some(block) => SegmentPayload::ToolCall(block.clone()),
            None => SegmentPayload::None,
        }
    }

    pub fn snapshot(&self) -> SegmentSnapshot {
        SegmentSnapshot {
            segment_id: self.id,
            kind: self.kind,
            state: self.state,
            text: (self.kind == SegmentKind::Text).then(|| self.text.clone()),
            tool_call: self.tool_call.clone(),
        }
    }
}

/// Reducer from normalized events to segment updates for one inner call.
///
/// At most one segment is open at a time and it is always the last one.
/// Every segment emits exactly one `End` or `Error` update over its lifetime.
pub struct SegmentMachine {
    plugins: Arc<PluginDirectory>,
    segments: Vec<Segment>,
}

impl SegmentMachine {
    pub fn new(plugins: Arc<PluginDirectory>) -> Self {
        Self {
            plugins,
            segments: Vec::new(),
        }
    }

    /// Applies one event and returns the updates to forward, in order.
    pub fn apply(&mut self, event: NormalizedEvent) -> Vec<OutputItem> {
        let mut out = Vec::new();
        match event {
            NormalizedEvent::TextDelta { text } => self.on_text(text, &mut out),
            NormalizedEvent::ToolCallOpen { id, name } => self.on_tool_open(id, name, &mut out),
            NormalizedEvent::ToolCallDelta { id, arguments } => {
                self.on_tool_delta(&id, &arguments, &mut out)
            }
            NormalizedEvent::TurnEnd => self.close_open(SegmentState::End, &mut out),
            NormalizedEvent::UsageReport(_) | NormalizedEvent::UsageSnapshot(_) => {}
        }
        out
    }

    /// Force-closes the open segment at stream exhaustion.
    pub fn finish(&mut self) -> Vec<OutputItem> {
        let mut out = Vec::new();
        self.close_open(SegmentState::End, &mut out);
        out
    }

    /// Moves the open segment to `Error` after an upstream failure.
    pub fn fail(&mut self) -> Vec<OutputItem> {
        let mut out = Vec::new();
        self.close_open(SegmentState::Error, &mut out);
        out
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn snapshots(&self) -> Vec<SegmentSnapshot> {
        self.segments.iter().map(Segment::snapshot).collect()
    }

    /// Tool calls proposed so far, in the order they were opened.
    pub fn tool_calls(&self) -> Vec<ToolCallRequest> {
        self.segments
            .iter()
            .filter_map(Segment::tool_call_block)
            .map(|block| ToolCallRequest {
                call_id: block.call_id.clone(),
                function_name: block.function_name.clone(),
                arguments: block.arguments.clone(),
            })
            .collect()
    }

    fn open_mut(&mut self) -> Option<&mut Segment> {
        self.segments.last_mut().filter(|segment| segment.is_open())
    }

    fn on_text(&mut self, text: String, out: &mut Vec<OutputItem>) {
        if let Some(segment) = self.open_mut()
            && segment.kind == SegmentKind::Text
        {
            segment.text.push_str(&text);
            segment.transition(SegmentState::Processing);
            out.extend(segment.emit(SegmentPayload::Text(text)));
            return;
        }
        self.close_open(SegmentState::End, out);
        let mut segment = Segment::text(text.clone());
        trace!(segment_id = %segment.id, "text segment opened");
        out.extend(segment.emit(SegmentPayload::Text(text)));
        self.segments.push(segment);
    }

    fn on_tool_open(&mut self, id: String, name: ToolName, out: &mut Vec<OutputItem>) {
        // Some vendors repeat the opening frame for a call that is already streaming.
        if let Some(segment) = self.open_mut()
            && let Some(block) = &segment.tool_call
            && !id.is_empty()
            && block.call_id == id
        {
            return;
        }
        self.close_open(SegmentState::End, out);
        debug!(call_id = %id, function_name = %name.function_name, "tool call segment opened");
        let block = ToolCallBlock {
            call_id: id,
            plugin_name: self.plugins.display_name(&name.plugin_key),
            plugin_key: name.plugin_key,
            function_name: name.function_name,
            plugin_type: name.plugin_type,
            arguments: String::new(),
            result_json: None,
        };
        let mut segment = Segment::tool_call(block);
        let payload = segment.identity_payload();
        out.extend(segment.emit(payload));
        self.segments.push(segment);
    }

    fn on_tool_delta(&mut self, id: &str, arguments: &str, out: &mut Vec<OutputItem>) {
        let Some(segment) = self.open_mut() else {
            trace!("tool call delta without an open segment ignored");
            return;
        };
        let Some(block) = segment.tool_call.as_mut() else {
            trace!("tool call delta while a text segment is open ignored");
            return;
        };
        if !id.is_empty() && !block.call_id.is_empty() && block.call_id != id {
            trace!(expected = %block.call_id, got = %id, "tool call delta for another call ignored");
            return;
        }
        if block.call_id.is_empty() {
            block.call_id = id.to_string();
        }
        block.arguments.push_str(arguments);
        segment.transition(SegmentState::Processing);
        out.extend(segment.emit(SegmentPayload::None));
    }

    fn close_open(&mut self, state: SegmentState, out: &mut Vec<OutputItem>) {
        if let Some(segment) = self.open_mut() {
            segment.transition(state);
            let payload = segment.identity_payload();
            out.extend(segment.emit(payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PluginType;
    use crate::plugin::EnabledPlugin;
    use crate::usage::Usage;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn machine() -> SegmentMachine {
        SegmentMachine::new(Arc::new(PluginDirectory::from_plugins(&[
            EnabledPlugin::new("wiki_search", "Team Wiki"),
        ])))
    }

    fn updates(items: &[OutputItem]) -> Vec<&SegmentUpdate> {
        items.iter().filter_map(OutputItem::as_segment).collect()
    }

    fn states(items: &[OutputItem]) -> Vec<SegmentState> {
        updates(items).iter().map(|u| u.state).collect()
    }

    #[test]
    fn text_only_sequence_matches_expected_updates() {
        let mut m = machine();
        let mut items = m.apply(NormalizedEvent::text("Hello"));
        items.extend(m.apply(NormalizedEvent::text(" world")));
        items.extend(m.apply(NormalizedEvent::TurnEnd));

        let u = updates(&items);
        assert_eq!(u.len(), 3);
        assert_eq!(u[0].state, SegmentState::Start);
        assert_eq!(u[0].payload, SegmentPayload::Text("Hello".into()));
        assert_eq!(u[1].state, SegmentState::Processing);
        assert_eq!(u[1].payload, SegmentPayload::Text(" world".into()));
        assert_eq!(u[2].state, SegmentState::End);
        assert_eq!(u[2].payload, SegmentPayload::None);
        assert!(u.iter().all(|x| x.segment_id == u[0].segment_id));
        assert_eq!(m.snapshots()[0].text.as_deref(), Some("Hello world"));
    }

    #[test]
    fn turn_end_is_idempotent() {
        let mut m = machine();
        m.apply(NormalizedEvent::text("a"));
        assert_eq!(states(&m.apply(NormalizedEvent::TurnEnd)), vec![SegmentState::End]);
        assert!(m.apply(NormalizedEvent::TurnEnd).is_empty());
        assert!(m.finish().is_empty());
        assert!(m.fail().is_empty());
    }

    #[test]
    fn turn_end_without_segments_emits_nothing() {
        let mut m = machine();
        assert!(m.apply(NormalizedEvent::TurnEnd).is_empty());
        assert!(m.segments().is_empty());
    }

    #[test]
    fn kind_switch_closes_previous_segment_first() {
        let mut m = machine();
        m.apply(NormalizedEvent::text("Let me check."));
        let items = m.apply(NormalizedEvent::tool_open(Some("call_1"), "wiki_search_invoke"));
        let u = updates(&items);
        assert_eq!(u.len(), 2);
        assert_eq!((u[0].kind, u[0].state), (SegmentKind::Text, SegmentState::End));
        assert_eq!((u[1].kind, u[1].state), (SegmentKind::ToolCall, SegmentState::Start));
        assert_ne!(u[0].segment_id, u[1].segment_id);
    }

    #[test]
    fn tool_open_resolves_plugin_identity() {
        let mut m = machine();
        let items = m.apply(NormalizedEvent::tool_open(None, "wiki_search_invoke"));
        let SegmentPayload::ToolCall(block) = &updates(&items)[0].payload else {
            panic!("expected tool call payload");
        };
        assert_eq!(block.call_id, "");
        assert_eq!(block.plugin_key, "wiki_search");
        assert_eq!(block.plugin_name, "Team Wiki");
        assert_eq!(block.plugin_type, PluginType::WikiPlugin);
    }

    #[test]
    fn tool_deltas_emit_state_only_and_accumulate_arguments() {
        let mut m = machine();
        m.apply(NormalizedEvent::tool_open(Some("call_1"), "weather_invoke"));
        let first = m.apply(NormalizedEvent::tool_delta(Some("call_1"), "{\"city\":"));
        let second = m.apply(NormalizedEvent::tool_delta(None, "\"Oslo\"}"));
        for items in [&first, &second] {
            let u = updates(items);
            assert_eq!(u.len(), 1);
            assert_eq!(u[0].state, SegmentState::Processing);
            assert_eq!(u[0].payload, SegmentPayload::None);
        }
        m.finish();
        let calls = m.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, r#"{"city":"Oslo"}"#);
        assert_eq!(calls[0].function_name, "weather_invoke");
    }

    #[test]
    fn tool_delta_for_other_call_or_without_tool_segment_is_ignored() {
        let mut m = machine();
        assert!(m.apply(NormalizedEvent::tool_delta(None, "{}")).is_empty());
        m.apply(NormalizedEvent::text("hi"));
        assert!(m.apply(NormalizedEvent::tool_delta(None, "{}")).is_empty());
        m.apply(NormalizedEvent::tool_open(Some("a"), "f"));
        assert!(m.apply(NormalizedEvent::tool_delta(Some("b"), "{}")).is_empty());
        assert_eq!(m.tool_calls()[0].arguments, "");
    }

    #[test]
    fn late_call_id_is_adopted() {
        let mut m = machine();
        m.apply(NormalizedEvent::tool_open(None, "f"));
        m.apply(NormalizedEvent::tool_delta(Some("call_9"), "{}"));
        assert_eq!(m.tool_calls()[0].call_id, "call_9");
    }

    #[test]
    fn repeated_open_for_same_call_does_not_split_segment() {
        let mut m = machine();
        m.apply(NormalizedEvent::tool_open(Some("call_1"), "f"));
        assert!(m.apply(NormalizedEvent::tool_open(Some("call_1"), "f")).is_empty());
        let items = m.apply(NormalizedEvent::tool_open(Some("call_2"), "g"));
        assert_eq!(
            states(&items),
            vec![SegmentState::End, SegmentState::Start]
        );
        assert_eq!(m.tool_calls().len(), 2);
    }

    #[test]
    fn fail_moves_open_segment_to_error_once() {
        let mut m = machine();
        m.apply(NormalizedEvent::text("partial"));
        let items = m.fail();
        assert_eq!(states(&items), vec![SegmentState::Error]);
        assert!(m.finish().is_empty());
        assert_eq!(m.segments()[0].state(), SegmentState::Error);
    }

    #[test]
    fn usage_reports_do_not_touch_segments() {
        let mut m = machine();
        assert!(m.apply(NormalizedEvent::UsageReport(Usage::new(1, 2, 3))).is_empty());
        assert!(m.apply(NormalizedEvent::UsageSnapshot(Usage::new(4, 5, 9))).is_empty());
        assert!(m.segments().is_empty());
    }

    #[test]
    fn text_after_turn_end_opens_new_segment() {
        let mut m = machine();
        m.apply(NormalizedEvent::text("a"));
        m.apply(NormalizedEvent::TurnEnd);
        let items = m.apply(NormalizedEvent::text("b"));
        assert_eq!(states(&items), vec![SegmentState::Start]);
        assert_eq!(m.segments().len(), 2);
    }

    fn event_strategy() -> impl Strategy<Value = NormalizedEvent> {
        prop_oneof![
            "[a-z ]{0,6}".prop_map(|text: String| NormalizedEvent::text(text)),
            (prop::option::of("call_[0-3]"), "(wiki_)?[a-z]{1,5}(_invoke)?").prop_map(
                |(id, name)| NormalizedEvent::tool_open(id.as_deref(), &name)
            ),
            (prop::option::of("call_[0-3]"), "[{}\":a-z]{0,4}")
                .prop_map(|(id, args)| NormalizedEvent::tool_delta(id.as_deref(), args)),
            Just(NormalizedEvent::TurnEnd),
            (0u64..50, 0u64..50)
                .prop_map(|(p, c)| NormalizedEvent::UsageReport(Usage::new(p, c, p + c))),
        ]
    }

    fn record(
        traces: &mut HashMap<uuid::Uuid, Vec<SegmentState>>,
        items: Vec<OutputItem>,
    ) -> Result<(), TestCaseError> {
        for item in items {
            let OutputItem::Segment(update) = item else {
                return Err(TestCaseError::fail("machine emitted a non-segment item"));
            };
            traces.entry(update.segment_id).or_default().push(update.state);
        }
        Ok(())
    }

    #[test]
    fn prop_every_segment_has_one_terminal_and_a_valid_trace() {
        proptest!(|(events in prop::collection::vec(event_strategy(), 0..40), fail_at_end in any::<bool>())| {
            let mut m = machine();
            let mut traces: HashMap<uuid::Uuid, Vec<SegmentState>> = HashMap::new();

            for event in events {
                let items = m.apply(event);
                record(&mut traces, items)?;
                // every state change has already been emitted
                prop_assert!(m.segments().iter().all(Segment::pushed));
                prop_assert!(m.segments().iter().filter(|s| s.is_open()).count() <= 1);
                if let Some(open) = m.segments().iter().position(Segment::is_open) {
                    prop_assert_eq!(open, m.segments().len() - 1);
                }
            }
            let closing = if fail_at_end { m.fail() } else { m.finish() };
            record(&mut traces, closing)?;

            prop_assert_eq!(traces.len(), m.segments().len());
            for segment in m.segments() {
                prop_assert!(!segment.is_open());
                prop_assert!(segment.pushed());
                let trace = &traces[&segment.id()];
                prop_assert_eq!(trace[0], SegmentState::Start);
                let terminals = trace.iter().filter(|s| s.is_terminal()).count();
                prop_assert_eq!(terminals, 1);
                prop_assert!(trace.last().is_some_and(SegmentState::is_terminal));
                for state in &trace[1..trace.len() - 1] {
                    prop_assert_eq!(*state, SegmentState::Processing);
                }
            }

            // re-closing never produces a second terminal update
            prop_assert!(m.finish().is_empty());
            prop_assert!(m.fail().is_empty());
        });
    }
}
