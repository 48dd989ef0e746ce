use super::retry::RetryConfig;
use crate::config::{AgentConfig, WorkspaceConfig};

/// Everything needed to call a Databricks model serving endpoint
#[derive(Clone)]
pub struct DatabricksProviderConfig {
    pub host: String,
    pub token: String,
    /// Name of the serving endpoint, which also selects the model
    pub endpoint: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
    pub retry: RetryConfig,
}

impl DatabricksProviderConfig {
    pub fn new<H, T, E>(host: H, token: T, endpoint: E) -> Self
    where
        H: Into<String>,
        T: Into<String>,
        E: Into<String>,
    {
        Self {
            host: host.into(),
            token: token.into(),
            endpoint: endpoint.into(),
            temperature: None,
            max_tokens: None,
            retry: RetryConfig::default(),
        }
    }

    pub fn from_workspace(workspace: &WorkspaceConfig, agent: &AgentConfig) -> Self {
        Self::new(
            workspace.host.clone(),
            workspace.token.clone(),
            agent.llm_endpoint_name.clone(),
        )
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// URL of the endpoint's invocation route
    pub fn invocations_url(&self) -> String {
        format!(
            "{}/serving-endpoints/{}/invocations",
            self.host.trim_end_matches('/'),
            self.endpoint
        )
    }
}

impl std::fmt::Debug for DatabricksProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabricksProviderConfig")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_workspace() {
        let workspace = WorkspaceConfig {
            host: "https://example.cloud.databricks.com/".to_string(),
            token: "dapi-secret".to_string(),
            warehouse_id: None,
        };
        let config = DatabricksProviderConfig::from_workspace(&workspace, &AgentConfig::default());

        assert_eq!(
            config.invocations_url(),
            "https://example.cloud.databricks.com/serving-endpoints/databricks-claude-sonnet-4/invocations"
        );
        assert!(!format!("{:?}", config).contains("dapi-secret"));
    }
}
