use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::base::{ChatCompletionChunk, ChunkStream, Provider};
use crate::errors::EndpointError;
use crate::models::message::Message;
use crate::models::tool::ToolSpec;

/// One scripted model turn
#[derive(Debug, Clone)]
pub enum MockTurn {
    /// Stream these chunks, then end the turn
    Chunks(Vec<ChatCompletionChunk>),
    /// Stream these chunks, then fail mid-stream
    ChunksThenError(Vec<ChatCompletionChunk>, String),
    /// Fail before any chunk is produced
    Error(String),
}

impl MockTurn {
    pub fn text(text: &str) -> Self {
        MockTurn::Chunks(vec![ChatCompletionChunk::text(text)])
    }

    /// A turn requesting one tool call, with its arguments split over two chunks
    pub fn tool_call(call_id: &str, name: &str, arguments: &str) -> Self {
        let split = arguments.len() / 2;
        let split = (0..=split)
            .rev()
            .find(|i| arguments.is_char_boundary(*i))
            .unwrap_or(0);
        MockTurn::Chunks(vec![
            ChatCompletionChunk::tool_call(0, Some(call_id), Some(name), &arguments[..split]),
            ChatCompletionChunk::tool_call(0, None, None, &arguments[split..]),
        ])
    }
}

/// A mock provider that plays back scripted turns for testing
pub struct MockProvider {
    turns: Mutex<VecDeque<MockTurn>>,
    /// Played once the script runs out; an empty text turn if unset
    fallback: Option<MockTurn>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of turns
    pub fn new(turns: Vec<MockTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            fallback: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider that plays the same turn forever
    pub fn repeating(turn: MockTurn) -> Self {
        Self {
            fallback: Some(turn),
            ..Self::new(vec![])
        }
    }

    /// The conversations the provider was called with, in order
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<ChunkStream, EndpointError> {
        self.requests.lock().unwrap().push(messages.to_vec());

        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| MockTurn::Chunks(vec![]));

        let items: Vec<Result<ChatCompletionChunk, EndpointError>> = match turn {
            MockTurn::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            MockTurn::ChunksThenError(chunks, error) => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(EndpointError::Other(error))))
                .collect(),
            MockTurn::Error(error) => return Err(EndpointError::Other(error)),
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
