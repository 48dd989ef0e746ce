use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of a single tool call. These never end a conversation: the loop
/// renders them as the tool result so the model can react to them.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Malformed arguments: {0}")]
    MalformedArguments(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Raised while building the tool registry at startup.
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Could not resolve tool '{name}': {source}")]
    Unresolved {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid specification for tool '{name}': {reason}")]
    InvalidSpec { name: String, reason: String },

    #[error("Duplicate tool name: {0}")]
    Duplicate(String),
}

/// Errors talking to the model serving endpoint.
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("Rate limited by endpoint: {0}")]
    RateLimited(String),

    #[error("Server error ({status}): {body}")]
    Server { status: StatusCode, body: String },

    #[error("Request failed ({status}): {body}")]
    Request { status: StatusCode, body: String },

    #[error("Context length exceeded. Message: {0}")]
    ContextLengthExceeded(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Could not decode completion chunk: {0}")]
    Decode(String),

    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<EndpointError>,
    },

    #[error("Endpoint error: {0}")]
    Other(String),
}

impl EndpointError {
    /// Whether a fresh attempt of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EndpointError::RateLimited(_) | EndpointError::Server { .. } => true,
            EndpointError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_display() {
        assert_eq!(
            ToolError::UnknownTool("nope".into()).to_string(),
            "Unknown tool: nope"
        );
        assert!(ToolError::MalformedArguments("expected value".into())
            .to_string()
            .starts_with("Malformed arguments"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(EndpointError::RateLimited("slow down".into()).is_transient());
        assert!(EndpointError::Server {
            status: StatusCode::BAD_GATEWAY,
            body: String::new()
        }
        .is_transient());
        assert!(!EndpointError::Request {
            status: StatusCode::BAD_REQUEST,
            body: String::new()
        }
        .is_transient());
        assert!(!EndpointError::ContextLengthExceeded("too long".into()).is_transient());
    }
}
