use std::collections::BTreeMap;

use uuid::Uuid;

use crate::models::message::{new_item_id, ItemStatus, Message, ToolInvocation};
use crate::models::responses::StreamEvent;
use crate::providers::base::{ChatCompletionChunk, ToolCallDelta};

#[derive(Debug)]
struct ToolCallAccumulator {
    item_id: String,
    call_id: Option<String>,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn new() -> Self {
        Self {
            item_id: format!("fc_{}", Uuid::new_v4().simple()),
            call_id: None,
            name: String::new(),
            arguments: String::new(),
        }
    }

    fn into_message(self) -> Message {
        let call_id = self
            .call_id
            .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
        Message::ToolInvocation(ToolInvocation {
            id: self.item_id,
            call_id,
            name: self.name,
            arguments: self.arguments,
        })
    }
}

/// Accumulates the chunks of one model turn into well-formed messages,
/// reporting each fragment as an incremental event on the way.
#[derive(Debug)]
pub struct TurnAggregator {
    item_id: String,
    text: String,
    /// Keyed by the endpoint's tool-call index, which need not be dense
    tool_calls: BTreeMap<usize, ToolCallAccumulator>,
}

impl Default for TurnAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnAggregator {
    pub fn new() -> Self {
        Self {
            item_id: new_item_id(),
            text: String::new(),
            tool_calls: BTreeMap::new(),
        }
    }

    /// Fold one chunk in, returning the incremental events it produced
    pub fn push(&mut self, chunk: ChatCompletionChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        // Only the first choice is ever requested
        for choice in chunk.choices.into_iter().filter(|c| c.index == 0) {
            if let Some(content) = choice.delta.content {
                let delta = content.into_text();
                if !delta.is_empty() {
                    self.text.push_str(&delta);
                    events.push(StreamEvent::OutputTextDelta {
                        item_id: self.item_id.clone(),
                        delta,
                    });
                }
            }

            for delta in choice.delta.tool_calls.unwrap_or_default() {
                events.push(self.push_tool_call(delta));
            }
        }

        events
    }

    fn push_tool_call(&mut self, delta: ToolCallDelta) -> StreamEvent {
        let index = self.tool_call_index(&delta);
        let acc = self
            .tool_calls
            .entry(index)
            .or_insert_with(ToolCallAccumulator::new);

        if let Some(id) = delta.id.as_ref().filter(|id| !id.is_empty()) {
            acc.call_id.get_or_insert_with(|| id.clone());
        }
        let (name, arguments) = match delta.function {
            Some(function) => (function.name, function.arguments.unwrap_or_default()),
            None => (None, String::new()),
        };
        if let Some(name) = &name {
            acc.name.push_str(name);
        }
        acc.arguments.push_str(&arguments);

        StreamEvent::FunctionCallArgumentsDelta {
            item_id: acc.item_id.clone(),
            call_id: delta.id,
            name,
            delta: arguments,
        }
    }

    /// Endpoints that omit `index` send each call whole; a new id starts a new call
    fn tool_call_index(&self, delta: &ToolCallDelta) -> usize {
        if let Some(index) = delta.index {
            return index;
        }
        match (self.tool_calls.last_key_value(), delta.id.as_deref()) {
            (None, _) => 0,
            (Some((last, acc)), Some(id)) if acc.call_id.as_deref().is_some_and(|c| c != id) => {
                last + 1
            }
            (Some((last, _)), _) => *last,
        }
    }

    /// Close the turn: the assistant text (if any) followed by each tool
    /// invocation, plus the "item completed" event for the text.
    ///
    /// A turn with neither text nor tool calls yields an empty assistant text
    /// so the conversation can end.
    pub fn finish(self) -> (Vec<Message>, Vec<StreamEvent>) {
        let mut messages = Vec::new();
        let mut events = Vec::new();

        if !self.text.is_empty() || self.tool_calls.is_empty() {
            let message = Message::AssistantText {
                id: self.item_id,
                content: self.text,
                status: ItemStatus::Completed,
            };
            events.push(StreamEvent::item_done(message.clone()));
            messages.push(message);
        }

        messages.extend(
            self.tool_calls
                .into_values()
                .map(ToolCallAccumulator::into_message),
        );
        (messages, events)
    }

    /// Close a turn the endpoint broke off: partial text is kept and marked
    /// incomplete, unfinished tool calls are dropped.
    pub fn abandon(self) -> Option<Message> {
        if self.text.is_empty() {
            return None;
        }
        Some(Message::AssistantText {
            id: self.item_id,
            content: self.text,
            status: ItemStatus::Incomplete,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_turn() {
        let mut aggregator = TurnAggregator::new();
        let first = aggregator.push(ChatCompletionChunk::text("4*3 "));
        let second = aggregator.push(ChatCompletionChunk::text("is 12"));
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);

        let (messages, events) = aggregator.finish();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].as_text(), Some("4*3 is 12"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_item_done(), Some(&messages[0]));
    }

    #[test]
    fn test_text_deltas_share_the_item_id() {
        let mut aggregator = TurnAggregator::new();
        let mut events = aggregator.push(ChatCompletionChunk::text("a"));
        events.extend(aggregator.push(ChatCompletionChunk::text("b")));
        let ids: Vec<_> = events
            .iter()
            .map(|e| match e {
                StreamEvent::OutputTextDelta { item_id, .. } => item_id.clone(),
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(ids[0], ids[1]);

        let (messages, _) = aggregator.finish();
        match &messages[0] {
            Message::AssistantText { id, .. } => assert_eq!(id, &ids[0]),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_tool_calls_accumulate_by_index() {
        let mut aggregator = TurnAggregator::new();
        aggregator.push(ChatCompletionChunk::tool_call(0, Some("call_a"), Some("lookup"), "{\"q\":"));
        aggregator.push(ChatCompletionChunk::tool_call(1, Some("call_b"), Some("python"), "{}"));
        aggregator.push(ChatCompletionChunk::tool_call(0, None, None, "\"x\"}"));

        let (messages, events) = aggregator.finish();
        assert!(events.is_empty());
        assert_eq!(messages.len(), 2);

        let first = messages[0].as_tool_invocation().unwrap();
        assert_eq!(first.call_id, "call_a");
        assert_eq!(first.name, "lookup");
        assert_eq!(first.arguments, "{\"q\":\"x\"}");

        let second = messages[1].as_tool_invocation().unwrap();
        assert_eq!(second.call_id, "call_b");
        assert_eq!(second.arguments, "{}");
    }

    #[test]
    fn test_calls_without_index_split_on_new_id() {
        let whole = |id: &str| ChatCompletionChunk {
            choices: vec![crate::providers::base::ChunkChoice {
                delta: crate::providers::base::ChunkDelta {
                    tool_calls: Some(vec![ToolCallDelta {
                        index: None,
                        id: Some(id.to_string()),
                        function: Some(crate::providers::base::FunctionDelta {
                            name: Some("lookup".to_string()),
                            arguments: Some("{}".to_string()),
                        }),
                    }]),
                    ..Default::default()
                },
                ..Default::default()
            }],
            ..Default::default()
        };

        let mut aggregator = TurnAggregator::new();
        aggregator.push(whole("call_a"));
        aggregator.push(whole("call_b"));
        let (messages, _) = aggregator.finish();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].as_tool_invocation().unwrap().call_id, "call_b");
    }

    #[test]
    fn test_sparse_indexes_create_no_extra_calls() {
        let mut aggregator = TurnAggregator::new();
        aggregator.push(ChatCompletionChunk::tool_call(
            5_000_000,
            Some("call_far"),
            Some("lookup"),
            "{}",
        ));
        aggregator.push(ChatCompletionChunk::tool_call(3, Some("call_near"), Some("lookup"), "{}"));

        let (messages, _) = aggregator.finish();
        let call_ids: Vec<_> = messages
            .iter()
            .map(|m| m.as_tool_invocation().unwrap().call_id.as_str())
            .collect();
        assert_eq!(call_ids, vec!["call_near", "call_far"]);
    }

    #[test]
    fn test_text_then_tool_call_order() {
        let mut aggregator = TurnAggregator::new();
        aggregator.push(ChatCompletionChunk::text("Let me check."));
        aggregator.push(ChatCompletionChunk::tool_call(0, Some("call_1"), Some("lookup"), "{}"));

        let (messages, events) = aggregator.finish();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_assistant_text());
        assert!(messages[1].as_tool_invocation().is_some());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_empty_turn_yields_empty_assistant_text() {
        let (messages, events) = TurnAggregator::new().finish();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].as_text(), Some(""));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_missing_call_id_is_generated() {
        let mut aggregator = TurnAggregator::new();
        aggregator.push(ChatCompletionChunk::tool_call(0, None, Some("lookup"), "{}"));
        let (messages, _) = aggregator.finish();
        assert!(messages[0]
            .as_tool_invocation()
            .unwrap()
            .call_id
            .starts_with("call_"));
    }

    #[test]
    fn test_abandon_keeps_partial_text() {
        let mut aggregator = TurnAggregator::new();
        aggregator.push(ChatCompletionChunk::text("Partial"));
        aggregator.push(ChatCompletionChunk::tool_call(0, Some("call_1"), Some("lookup"), "{"));

        match aggregator.abandon() {
            Some(Message::AssistantText { content, status, .. }) => {
                assert_eq!(content, "Partial");
                assert_eq!(status, ItemStatus::Incomplete);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(TurnAggregator::new().abandon().is_none());
    }
}
