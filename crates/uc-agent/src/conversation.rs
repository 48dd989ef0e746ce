//! The conversation loop: alternate model turns and tool turns over an
//! append-only history until the model gives a final answer or the turn
//! budget runs out.
//!
//! [`Conversation::advance`] drives the loop one event at a time;
//! [`Conversation::into_stream`] wraps it as a stream.

mod aggregator;

pub use aggregator::TurnAggregator;

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};
use tracing::Instrument;

use crate::errors::{EndpointError, ToolError, ToolResult};
use crate::models::message::{Message, ToolInvocation};
use crate::models::responses::StreamEvent;
use crate::providers::base::{ChunkStream, Provider};
use crate::registry::ToolRegistry;

/// Text of the assistant message emitted when the turn budget is exhausted
pub const MAX_ITERATIONS_NOTICE: &str = "Max iterations reached. Stopping.";

/// What the loop will do next, derived from the history
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// Some tool invocation has no result yet; the earliest one runs next
    PendingTool(ToolInvocation),
    /// The history ends with a final assistant answer
    Done,
    /// The model is asked for the next step
    AwaitingModel,
}

enum Phase {
    Inspect,
    Streaming {
        chunks: ChunkStream,
        aggregator: TurnAggregator,
    },
    Finished,
}

/// One run of the loop over a conversation.
///
/// Each call to [`advance`](Conversation::advance) makes progress until it can
/// return the next event. Every model turn and every tool turn costs one unit
/// of the `max_turns` budget.
pub struct Conversation {
    messages: Vec<Message>,
    registry: Arc<ToolRegistry>,
    provider: Arc<dyn Provider>,
    max_turns: usize,
    turns: usize,
    phase: Phase,
    pending: VecDeque<StreamEvent>,
    failure: Option<EndpointError>,
}

impl Conversation {
    pub fn new(
        messages: Vec<Message>,
        registry: Arc<ToolRegistry>,
        provider: Arc<dyn Provider>,
        max_turns: usize,
    ) -> Self {
        Self {
            messages,
            registry,
            provider,
            max_turns,
            turns: 0,
            phase: Phase::Inspect,
            pending: VecDeque::new(),
            failure: None,
        }
    }

    /// The history so far, including everything appended by the loop
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Turns consumed so far
    pub fn turns(&self) -> usize {
        self.turns
    }

    pub fn state(&self) -> LoopState {
        // A result answers the earliest unanswered invocation with its call_id
        let mut unanswered: Vec<&ToolInvocation> = Vec::new();
        for message in &self.messages {
            match message {
                Message::ToolInvocation(invocation) => unanswered.push(invocation),
                Message::ToolResult(result) => {
                    if let Some(pos) = unanswered
                        .iter()
                        .position(|invocation| invocation.call_id == result.call_id)
                    {
                        unanswered.remove(pos);
                    }
                }
                _ => {}
            }
        }

        if let Some(invocation) = unanswered.first() {
            return LoopState::PendingTool((*invocation).clone());
        }

        match self.messages.last() {
            Some(message) if message.is_assistant_text() => LoopState::Done,
            _ => LoopState::AwaitingModel,
        }
    }

    /// Produce the next event, or `None` once the loop has finished.
    ///
    /// An endpoint error ends the loop. Partial assistant text streamed
    /// before the failure is kept, marked incomplete and reported before the
    /// error is returned.
    pub async fn advance(&mut self) -> Result<Option<StreamEvent>, EndpointError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if let Some(error) = self.failure.take() {
                return Err(error);
            }

            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Finished => return Ok(None),
                Phase::Inspect => self.step().await?,
                Phase::Streaming {
                    mut chunks,
                    mut aggregator,
                } => match chunks.next().await {
                    Some(Ok(chunk)) => {
                        self.pending.extend(aggregator.push(chunk));
                        self.phase = Phase::Streaming { chunks, aggregator };
                    }
                    Some(Err(error)) => {
                        tracing::error!(error = %error, "model turn failed mid-stream");
                        if let Some(partial) = aggregator.abandon() {
                            self.pending.push_back(StreamEvent::item_done(partial.clone()));
                            self.messages.push(partial);
                        }
                        self.failure = Some(error);
                    }
                    None => {
                        let (messages, events) = aggregator.finish();
                        tracing::debug!(appended = messages.len(), "model turn finished");
                        self.messages.extend(messages);
                        self.pending.extend(events);
                        self.phase = Phase::Inspect;
                    }
                },
            }
        }
    }

    /// Decide the next transition from the history and start it
    async fn step(&mut self) -> Result<(), EndpointError> {
        let state = self.state();
        if state == LoopState::Done {
            return Ok(());
        }

        if self.turns >= self.max_turns {
            tracing::warn!(max_turns = self.max_turns, "turn budget exhausted");
            let notice = Message::assistant(MAX_ITERATIONS_NOTICE);
            self.pending.push_back(StreamEvent::item_done(notice.clone()));
            self.messages.push(notice);
            return Ok(());
        }
        self.turns += 1;

        match state {
            LoopState::PendingTool(invocation) => {
                let registry = Arc::clone(&self.registry);
                let output = Self::run_tool(registry, &invocation, self.turns).await;
                let result = Message::tool_result(invocation.call_id, output);
                self.pending.push_back(StreamEvent::item_done(result.clone()));
                self.messages.push(result);
                self.phase = Phase::Inspect;
            }
            LoopState::AwaitingModel => {
                let span = tracing::info_span!("model_turn", turn = self.turns);
                let chunks = self
                    .provider
                    .stream(&self.messages, self.registry.specs())
                    .instrument(span)
                    .await
                    .inspect_err(|error| tracing::error!(error = %error, "model turn failed"))?;
                self.phase = Phase::Streaming {
                    chunks,
                    aggregator: TurnAggregator::new(),
                };
            }
            LoopState::Done => {}
        }
        Ok(())
    }

    async fn run_tool(
        registry: Arc<ToolRegistry>,
        invocation: &ToolInvocation,
        turn: usize,
    ) -> String {
        tracing::info!(
            tool = %invocation.name,
            call_id = %invocation.call_id,
            turn,
            "running tool"
        );

        let result = match parse_arguments(&invocation.arguments) {
            Ok(arguments) => registry.execute(&invocation.name, arguments).await,
            Err(error) => Err(error),
        };
        result.unwrap_or_else(|error| {
            tracing::warn!(tool = %invocation.name, error = %error, "tool call rejected");
            error.to_string()
        })
    }

    /// Run the loop as a stream of events; dropping the stream abandons any
    /// in-flight model response.
    pub fn into_stream(self) -> BoxStream<'static, Result<StreamEvent, EndpointError>> {
        Box::pin(futures::stream::try_unfold(
            self,
            |mut conversation| async move {
                Ok(conversation
                    .advance()
                    .await?
                    .map(|event| (event, conversation)))
            },
        ))
    }
}

/// Arguments arrive as JSON text; empty text means no arguments
fn parse_arguments(raw: &str) -> ToolResult<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(arguments)) => Ok(arguments),
        Ok(other) => Err(ToolError::MalformedArguments(format!(
            "expected a JSON object, got {}",
            other
        ))),
        Err(e) => Err(ToolError::MalformedArguments(format!(
            "could not parse {:?}: {}",
            raw, e
        ))),
    }
}
