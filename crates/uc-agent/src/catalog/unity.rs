use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::{tool_name, FunctionCatalog, FunctionResult};
use crate::config::WorkspaceConfig;

const STATEMENT_WAIT_TIMEOUT: &str = "30s";

/// Unity Catalog functions of a Databricks workspace.
///
/// Functions are described through the Unity Catalog REST API and executed as
/// SQL statements on a warehouse.
pub struct UnityCatalogClient {
    client: Client,
    host: String,
    token: String,
    warehouse_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FunctionInfo {
    name: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    input_params: Option<FunctionParameterInfos>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionParameterInfos {
    #[serde(default)]
    parameters: Vec<FunctionParameterInfo>,
}

#[derive(Debug, Deserialize)]
struct FunctionParameterInfo {
    name: String,
    #[serde(default)]
    type_name: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    parameter_default: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(default)]
    statement_id: Option<String>,
    status: StatementStatus,
    #[serde(default)]
    result: Option<StatementResult>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: String,
    #[serde(default)]
    error: Option<StatementError>,
}

#[derive(Debug, Deserialize)]
struct StatementError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    data_array: Option<Vec<Vec<Option<String>>>>,
}

impl UnityCatalogClient {
    pub fn new(workspace: &WorkspaceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self {
            client,
            host: workspace.host.trim_end_matches('/').to_string(),
            token: workspace.token.clone(),
            warehouse_id: workspace.warehouse_id.clone(),
        })
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.host, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;
        Self::json_or_error(response).await
    }

    async fn post(&self, path: &str, payload: Value) -> Result<Value> {
        let url = format!("{}{}", self.host, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;
        Self::json_or_error(response).await
    }

    async fn json_or_error(response: reqwest::Response) -> Result<Value> {
        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status => {
                let err_text = response.text().await.unwrap_or_default();
                Err(anyhow!("Request failed: {}: {}", status, err_text))
            }
        }
    }
}

#[async_trait]
impl FunctionCatalog for UnityCatalogClient {
    async fn describe(&self, full_name: &str) -> Result<Value> {
        let response = self
            .get(&format!("/api/2.1/unity-catalog/functions/{}", full_name))
            .await?;
        let info: FunctionInfo =
            serde_json::from_value(response).context("Unexpected function info payload")?;
        tracing::debug!(function = %info.name, "described unity catalog function");
        Ok(function_info_to_tool_spec(full_name, info))
    }

    async fn execute(
        &self,
        full_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<FunctionResult> {
        let warehouse_id = self
            .warehouse_id
            .as_deref()
            .ok_or_else(|| anyhow!("No SQL warehouse configured to execute {}", full_name))?;

        let payload = json!({
            "warehouse_id": warehouse_id,
            "statement": call_statement(full_name, arguments)?,
            "parameters": statement_parameters(arguments),
            "wait_timeout": STATEMENT_WAIT_TIMEOUT,
            "on_wait_timeout": "CANCEL",
            "disposition": "INLINE",
            "format": "JSON_ARRAY",
        });

        let response = self.post("/api/2.0/sql/statements", payload).await?;
        let statement: StatementResponse =
            serde_json::from_value(response).context("Unexpected statement payload")?;
        tracing::debug!(
            function = full_name,
            statement_id = statement.statement_id.as_deref().unwrap_or_default(),
            state = %statement.status.state,
            "executed unity catalog function"
        );
        Ok(statement_to_result(statement))
    }
}

fn function_info_to_tool_spec(full_name: &str, info: FunctionInfo) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in info.input_params.unwrap_or_default().parameters {
        let mut schema = json!({ "type": json_schema_type(param.type_name.as_deref()) });
        if let Some(comment) = param.comment.filter(|c| !c.is_empty()) {
            schema["description"] = json!(comment);
        }
        if param.parameter_default.is_none() {
            required.push(json!(param.name));
        }
        properties.insert(param.name, schema);
    }

    let name = tool_name(info.full_name.as_deref().unwrap_or(full_name));
    let description = info
        .comment
        .unwrap_or_else(|| format!("Unity Catalog function {}", full_name));

    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "strict": true,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        }
    })
}

fn json_schema_type(type_name: Option<&str>) -> &'static str {
    match type_name.map(str::to_ascii_uppercase).as_deref() {
        Some("BYTE" | "SHORT" | "INT" | "LONG") => "integer",
        Some("FLOAT" | "DOUBLE" | "DECIMAL") => "number",
        Some("BOOLEAN") => "boolean",
        Some("ARRAY") => "array",
        Some("MAP" | "STRUCT") => "object",
        _ => "string",
    }
}

fn quote_identifier(part: &str) -> String {
    format!("`{}`", part.replace('`', "``"))
}

/// `SELECT `catalog`.`schema`.`fn`(a => :a, b => :b)` using named parameter invocation
fn call_statement(full_name: &str, arguments: &Map<String, Value>) -> Result<String> {
    let parts: Vec<&str> = full_name.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        bail!(
            "Expected a fully qualified catalog.schema.function name, got {}",
            full_name
        );
    }
    let function = parts
        .iter()
        .map(|p| quote_identifier(p))
        .collect::<Vec<_>>()
        .join(".");

    let mut args = Vec::new();
    for name in arguments.keys() {
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!("Invalid parameter name {:?}", name);
        }
        args.push(format!("{} => :{}", quote_identifier(name), name));
    }

    Ok(format!("SELECT {}({})", function, args.join(", ")))
}

fn statement_parameters(arguments: &Map<String, Value>) -> Vec<Value> {
    arguments
        .iter()
        .map(|(name, value)| match value {
            Value::Null => json!({ "name": name, "type": "STRING" }),
            Value::String(s) => json!({ "name": name, "value": s, "type": "STRING" }),
            Value::Bool(b) => json!({ "name": name, "value": b.to_string(), "type": "BOOLEAN" }),
            Value::Number(n) if n.is_i64() || n.is_u64() => {
                json!({ "name": name, "value": n.to_string(), "type": "BIGINT" })
            }
            Value::Number(n) => json!({ "name": name, "value": n.to_string(), "type": "DOUBLE" }),
            other => json!({ "name": name, "value": other.to_string(), "type": "STRING" }),
        })
        .collect()
}

fn statement_to_result(statement: StatementResponse) -> FunctionResult {
    match statement.status.state.as_str() {
        "SUCCEEDED" => {
            let value = statement
                .result
                .and_then(|r| r.data_array)
                .and_then(|rows| rows.into_iter().next())
                .and_then(|row| row.into_iter().next())
                .flatten();
            FunctionResult {
                value: Some(value.unwrap_or_else(|| "None".to_string())),
                error: None,
            }
        }
        "PENDING" | "RUNNING" => FunctionResult::error(format!(
            "Function did not finish within {}",
            STATEMENT_WAIT_TIMEOUT
        )),
        state => {
            let message = statement
                .status
                .error
                .map(|e| match (e.error_code, e.message) {
                    (Some(code), Some(message)) => format!("{}: {}", code, message),
                    (_, Some(message)) => message,
                    (Some(code), None) => code,
                    (None, None) => state.to_string(),
                })
                .unwrap_or_else(|| format!("Statement {}", state));
            FunctionResult::error(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn workspace(host: String) -> WorkspaceConfig {
        WorkspaceConfig {
            host,
            token: "test_token".to_string(),
            warehouse_id: Some("wh-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_describe_builds_tool_spec() -> Result<()> {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/2.1/unity-catalog/functions/system.ai.python_exec"))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "python_exec",
                "full_name": "system.ai.python_exec",
                "comment": "Executes Python code and returns its stdout.",
                "input_params": {
                    "parameters": [{
                        "name": "code",
                        "type_name": "STRING",
                        "comment": "Python code to execute."
                    }]
                }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = UnityCatalogClient::new(&workspace(mock_server.uri()))?;
        let spec = client.describe("system.ai.python_exec").await?;

        assert_eq!(spec["function"]["name"], "system__ai__python_exec");
        assert_eq!(spec["function"]["strict"], true);
        assert_eq!(
            spec["function"]["parameters"]["properties"]["code"]["type"],
            "string"
        );
        assert_eq!(spec["function"]["parameters"]["required"], json!(["code"]));
        Ok(())
    }

    #[tokio::test]
    async fn test_describe_unknown_function_fails() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error_code": "NOT_FOUND",
                "message": "Routine 'main.default.nope' does not exist."
            })))
            .mount(&mock_server)
            .await;

        let client = UnityCatalogClient::new(&workspace(mock_server.uri()))?;
        let err = client.describe("main.default.nope").await.unwrap_err();
        assert!(err.to_string().contains("404"));
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_runs_statement() -> Result<()> {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/2.0/sql/statements"))
            .and(body_partial_json(json!({
                "warehouse_id": "wh-1",
                "statement": "SELECT `system`.`ai`.`python_exec`(`code` => :code)",
                "parameters": [{"name": "code", "value": "print(4*3)", "type": "STRING"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statement_id": "01ef",
                "status": {"state": "SUCCEEDED"},
                "result": {"data_array": [["12\n"]]}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = UnityCatalogClient::new(&workspace(mock_server.uri()))?;
        let mut arguments = Map::new();
        arguments.insert("code".to_string(), json!("print(4*3)"));
        let result = client.execute("system.ai.python_exec", &arguments).await?;

        assert_eq!(result, FunctionResult::value("12\n"));
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_reports_function_error() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/2.0/sql/statements"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": {
                    "state": "FAILED",
                    "error": {"error_code": "BAD_REQUEST", "message": "NameError: name 'x' is not defined"}
                }
            })))
            .mount(&mock_server)
            .await;

        let client = UnityCatalogClient::new(&workspace(mock_server.uri()))?;
        let mut arguments = Map::new();
        arguments.insert("code".to_string(), json!("print(x)"));
        let result = client.execute("system.ai.python_exec", &arguments).await?;

        assert_eq!(
            result.error.as_deref(),
            Some("BAD_REQUEST: NameError: name 'x' is not defined")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_without_warehouse() -> Result<()> {
        let mut config = workspace("http://localhost:1".to_string());
        config.warehouse_id = None;
        let client = UnityCatalogClient::new(&config)?;
        let err = client
            .execute("system.ai.python_exec", &Map::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No SQL warehouse"));
        Ok(())
    }

    #[test]
    fn test_call_statement_validation() {
        assert!(call_statement("python_exec", &Map::new()).is_err());

        let mut arguments = Map::new();
        arguments.insert("bad name".to_string(), json!(1));
        assert!(call_statement("a.b.c", &arguments).is_err());

        let mut arguments = Map::new();
        arguments.insert("n".to_string(), json!(15));
        assert_eq!(
            call_statement("main.default.fib", &arguments).unwrap(),
            "SELECT `main`.`default`.`fib`(`n` => :n)"
        );
        assert_eq!(
            statement_parameters(&arguments),
            vec![json!({"name": "n", "value": "15", "type": "BIGINT"})]
        );
    }

    #[test]
    fn test_json_schema_types() {
        assert_eq!(json_schema_type(Some("INT")), "integer");
        assert_eq!(json_schema_type(Some("double")), "number");
        assert_eq!(json_schema_type(Some("BOOLEAN")), "boolean");
        assert_eq!(json_schema_type(Some("TIMESTAMP")), "string");
        assert_eq!(json_schema_type(None), "string");
    }
}
