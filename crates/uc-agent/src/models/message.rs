use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::content::{Content, ContentPart};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Completed,
    /// The endpoint failed before the text was complete
    Incomplete,
}

/// A request from the model to call a named tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub call_id: String,
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them
    pub arguments: String,
}

/// The output of a tool invocation, correlated by `call_id`
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub call_id: String,
    pub output: String,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Item", into = "Item")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    AssistantText {
        id: String,
        content: String,
        status: ItemStatus,
    },
    ToolInvocation(ToolInvocation),
    ToolResult(ToolOutput),
}

impl Message {
    pub fn system<S: Into<String>>(content: S) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Create a completed assistant message with a fresh item id
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Message::AssistantText {
            id: new_item_id(),
            content: content.into(),
            status: ItemStatus::Completed,
        }
    }

    pub fn tool_invocation<C, N, A>(call_id: C, name: N, arguments: A) -> Self
    where
        C: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        let call_id = call_id.into();
        Message::ToolInvocation(ToolInvocation {
            id: call_id.clone(),
            call_id,
            name: name.into(),
            arguments: arguments.into(),
        })
    }

    pub fn tool_result<C: Into<String>, O: Into<String>>(call_id: C, output: O) -> Self {
        Message::ToolResult(ToolOutput {
            call_id: call_id.into(),
            output: output.into(),
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::AssistantText { .. } | Message::ToolInvocation(_) => Role::Assistant,
            Message::ToolResult(_) => Role::Tool,
        }
    }

    /// Get the text of a system, user or assistant message
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::AssistantText { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn as_tool_invocation(&self) -> Option<&ToolInvocation> {
        match self {
            Message::ToolInvocation(invocation) => Some(invocation),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolOutput> {
        match self {
            Message::ToolResult(result) => Some(result),
            _ => None,
        }
    }

    /// An assistant text message; it ends the conversation unless tool calls are outstanding
    pub fn is_assistant_text(&self) -> bool {
        matches!(self, Message::AssistantText { .. })
    }
}

pub(crate) fn new_item_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

#[derive(Debug, Error)]
#[error("invalid conversation item: {0}")]
pub struct InvalidItem(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ItemKind {
    Message,
    FunctionCall,
    FunctionCallOutput,
}

/// Flat wire representation shared by every kind of conversation item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Item {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<ItemKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<ItemStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

impl TryFrom<Item> for Message {
    type Error = InvalidItem;

    fn try_from(item: Item) -> Result<Self, Self::Error> {
        let text = |content: Option<Content>| content.map(Content::into_text).unwrap_or_default();

        match item.kind.unwrap_or(ItemKind::Message) {
            ItemKind::FunctionCall => {
                let call_id = item
                    .call_id
                    .ok_or_else(|| InvalidItem("function_call without call_id".into()))?;
                let name = item
                    .name
                    .ok_or_else(|| InvalidItem("function_call without name".into()))?;
                Ok(Message::ToolInvocation(ToolInvocation {
                    id: item.id.unwrap_or_else(|| call_id.clone()),
                    call_id,
                    name,
                    arguments: item.arguments.unwrap_or_default(),
                }))
            }
            ItemKind::FunctionCallOutput => {
                let call_id = item
                    .call_id
                    .ok_or_else(|| InvalidItem("function_call_output without call_id".into()))?;
                Ok(Message::tool_result(call_id, item.output.unwrap_or_default()))
            }
            ItemKind::Message => match item.role {
                Some(Role::System) => Ok(Message::system(text(item.content))),
                Some(Role::User) => Ok(Message::user(text(item.content))),
                Some(Role::Assistant) => Ok(Message::AssistantText {
                    id: item.id.unwrap_or_else(new_item_id),
                    content: text(item.content),
                    status: item.status.unwrap_or_default(),
                }),
                Some(Role::Tool) => {
                    let call_id = item
                        .call_id
                        .ok_or_else(|| InvalidItem("tool message without call_id".into()))?;
                    Ok(Message::tool_result(call_id, text(item.content)))
                }
                None => Err(InvalidItem("message without role".into())),
            },
        }
    }
}

impl From<Message> for Item {
    fn from(message: Message) -> Self {
        match message {
            Message::System { content } => Item {
                kind: Some(ItemKind::Message),
                role: Some(Role::System),
                content: Some(Content::Text(content)),
                ..Default::default()
            },
            Message::User { content } => Item {
                kind: Some(ItemKind::Message),
                role: Some(Role::User),
                content: Some(Content::Text(content)),
                ..Default::default()
            },
            Message::AssistantText {
                id,
                content,
                status,
            } => Item {
                kind: Some(ItemKind::Message),
                id: Some(id),
                role: Some(Role::Assistant),
                status: Some(status),
                content: Some(Content::Parts(vec![ContentPart::output_text(content)])),
                ..Default::default()
            },
            Message::ToolInvocation(invocation) => Item {
                kind: Some(ItemKind::FunctionCall),
                id: Some(invocation.id),
                call_id: Some(invocation.call_id),
                name: Some(invocation.name),
                arguments: Some(invocation.arguments),
                ..Default::default()
            },
            Message::ToolResult(result) => Item {
                kind: Some(ItemKind::FunctionCallOutput),
                call_id: Some(result.call_id),
                output: Some(result.output),
                ..Default::default()
            },
        }
    }
}
