use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::errors::EndpointError;
use crate::models::content::Content;
use crate::models::message::Message;
use crate::models::tool::ToolSpec;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, alias = "input_tokens")]
    pub prompt_tokens: Option<i32>,
    #[serde(default, alias = "output_tokens")]
    pub completion_tokens: Option<i32>,
    #[serde(default)]
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        prompt_tokens: Option<i32>,
        completion_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

/// One incremental piece of a chat completion, as streamed by the endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// A fragment of one tool call. Fragments sharing an `index` belong to the
/// same call; `id` and `name` usually arrive only on the first one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ChatCompletionChunk {
    /// A chunk carrying a fragment of assistant text
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::from_delta(ChunkDelta {
            content: Some(Content::Text(text.into())),
            ..Default::default()
        })
    }

    /// A chunk carrying a fragment of the tool call at `index`
    pub fn tool_call(
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: &str,
    ) -> Self {
        Self::from_delta(ChunkDelta {
            tool_calls: Some(vec![ToolCallDelta {
                index: Some(index),
                id: id.map(String::from),
                function: Some(FunctionDelta {
                    name: name.map(String::from),
                    arguments: Some(arguments.to_string()),
                }),
            }]),
            ..Default::default()
        })
    }

    fn from_delta(delta: ChunkDelta) -> Self {
        Self {
            choices: vec![ChunkChoice {
                delta,
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

pub type ChunkStream = BoxStream<'static, Result<ChatCompletionChunk, EndpointError>>;

/// Base trait for model serving endpoints
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start a streamed completion over the conversation with the given tools
    /// available. The stream ends with the model's turn; dropping it abandons
    /// the request.
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<ChunkStream, EndpointError>;
}
