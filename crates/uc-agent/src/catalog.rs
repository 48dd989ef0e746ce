//! Connectors to external catalogs of callable functions.
//!
//! A catalog knows how to describe a function by its fully qualified name
//! (`catalog.schema.function`) and how to execute it. The registry only ever
//! talks to a catalog through [`FunctionCatalog`].

pub mod unity;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The outcome of executing a catalog function: a value, or an error the
/// function itself reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub value: Option<String>,
    pub error: Option<String>,
}

impl FunctionResult {
    pub fn value<S: Into<String>>(value: S) -> Self {
        Self {
            value: Some(value.into()),
            error: None,
        }
    }

    pub fn error<S: Into<String>>(error: S) -> Self {
        Self {
            value: None,
            error: Some(error.into()),
        }
    }

    /// The text handed back to the model. A reported error takes precedence.
    pub fn into_display(self) -> String {
        match (self.error, self.value) {
            (Some(error), _) => error,
            (None, Some(value)) => value,
            (None, None) => "None".to_string(),
        }
    }
}

#[async_trait]
pub trait FunctionCatalog: Send + Sync {
    /// Fetch the chat-completions tool specification of a function
    async fn describe(&self, full_name: &str) -> Result<Value>;

    /// Execute a function with structured arguments.
    ///
    /// `Err` is reserved for failing to reach the catalog at all; errors raised
    /// by the function are reported through [`FunctionResult::error`].
    async fn execute(&self, full_name: &str, arguments: &Map<String, Value>)
        -> Result<FunctionResult>;
}

/// Tool name advertised to the model for a catalog function
/// (`system.ai.python_exec` becomes `system__ai__python_exec`)
pub fn tool_name(full_name: &str) -> String {
    full_name.replace('.', "__")
}
