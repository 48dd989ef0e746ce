use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::Message;

/// The agent's request shape: a conversation plus opaque passthrough data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsesRequest {
    pub input: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_inputs: Option<Value>,
    /// Ask the serving surface for incremental events instead of one response
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl ResponsesRequest {
    pub fn new(input: Vec<Message>) -> Self {
        Self {
            input,
            ..Default::default()
        }
    }
}

/// The agent's response shape: every finalized item, in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsesResponse {
    pub output: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_outputs: Option<Value>,
}

/// One unit of streamed output. Consumers must match on the variant before
/// reading type-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A finalized item was appended to the conversation
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: Message },

    /// A fragment of assistant text
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { item_id: String, delta: String },

    /// A fragment of a tool invocation requested by the model
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        item_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        delta: String,
    },
}

impl StreamEvent {
    pub fn item_done(item: Message) -> Self {
        StreamEvent::OutputItemDone { item }
    }

    /// The finalized item, if this is an "item completed" event
    pub fn as_item_done(&self) -> Option<&Message> {
        match self {
            StreamEvent::OutputItemDone { item } => Some(item),
            _ => None,
        }
    }

    pub fn into_item_done(self) -> Option<Message> {
        match self {
            StreamEvent::OutputItemDone { item } => Some(item),
            _ => None,
        }
    }
}
