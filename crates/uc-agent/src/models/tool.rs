use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the model may call, as advertised to the endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    /// The name of the tool, unique within a registry
    pub name: String,
    /// A description of what the tool does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the accepted arguments
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolSpec {
            name: name.into(),
            description: Some(description.into()),
            parameters,
        }
    }

    /// Read a chat-completions function tool
    /// (`{"type": "function", "function": {...}}`), dropping transport-only
    /// fields such as `strict` that the serving endpoint does not accept.
    pub fn from_function_spec(value: &Value) -> Result<Self, String> {
        let function = value.get("function").unwrap_or(value);

        let name = function
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| "missing function name".to_string())?;

        let description = function
            .get("description")
            .and_then(Value::as_str)
            .map(String::from);

        let parameters = function
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}}));
        if !parameters.is_object() {
            return Err("parameters must be a JSON schema object".to_string());
        }

        Ok(ToolSpec {
            name: name.to_string(),
            description,
            parameters,
        })
    }
}
