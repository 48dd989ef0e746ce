use anyhow::{Context, Result};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use std::sync::Arc;

use crate::catalog::unity::UnityCatalogClient;
use crate::config::{AgentConfig, Settings, WorkspaceConfig};
use crate::conversation::Conversation;
use crate::errors::EndpointError;
use crate::models::message::Message;
use crate::models::responses::{ResponsesRequest, ResponsesResponse, StreamEvent};
use crate::providers::base::Provider;
use crate::providers::configs::DatabricksProviderConfig;
use crate::providers::databricks::DatabricksProvider;
use crate::registry::ToolRegistry;

/// Agent integrates a served model with the catalog tools it may call.
///
/// Cheap to clone; every request runs its own [`Conversation`] over the
/// shared, read-only registry, provider and configuration.
#[derive(Clone)]
pub struct Agent {
    config: Arc<AgentConfig>,
    registry: Arc<ToolRegistry>,
    provider: Arc<dyn Provider>,
}

impl Agent {
    pub fn new(config: AgentConfig, registry: ToolRegistry, provider: Arc<dyn Provider>) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            provider,
        }
    }

    /// Wire the agent to a Databricks workspace: resolve the configured
    /// Unity Catalog functions and target the configured serving endpoint.
    pub async fn from_workspace(config: AgentConfig, workspace: &WorkspaceConfig) -> Result<Self> {
        let catalog = Arc::new(UnityCatalogClient::new(workspace)?);
        let registry = ToolRegistry::build(&config.tool_catalog_names, catalog)
            .await
            .context("Failed to build the tool registry")?;
        tracing::info!(
            tools = registry.len(),
            endpoint = %config.llm_endpoint_name,
            "agent ready"
        );

        let provider = DatabricksProvider::new(DatabricksProviderConfig::from_workspace(
            workspace, &config,
        ))?;
        Ok(Self::new(config, registry, Arc::new(provider)))
    }

    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        Self::from_workspace(settings.agent_config()?, &settings.workspace_config()?).await
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Start a conversation over the input, with the system prompt in front
    pub fn conversation(&self, input: Vec<Message>) -> Conversation {
        let mut messages = Vec::with_capacity(input.len() + 1);
        if let Some(prompt) = &self.config.prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(input);

        Conversation::new(
            messages,
            Arc::clone(&self.registry),
            Arc::clone(&self.provider),
            self.config.max_turns,
        )
    }

    /// Create a stream that yields each event as it's generated by the agent
    pub fn predict_stream(
        &self,
        request: ResponsesRequest,
    ) -> BoxStream<'static, Result<StreamEvent, EndpointError>> {
        tracing::info!(items = request.input.len(), "predict_stream");
        self.conversation(request.input).into_stream()
    }

    /// Run the conversation to the end and return every finalized item
    pub async fn predict(
        &self,
        request: ResponsesRequest,
    ) -> Result<ResponsesResponse, EndpointError> {
        tracing::info!(items = request.input.len(), "predict");
        let custom_outputs = request.custom_inputs.clone();

        let output: Vec<Message> = self
            .conversation(request.input)
            .into_stream()
            .try_filter_map(|event| futures::future::ok(event.into_item_done()))
            .try_collect()
            .await?;

        Ok(ResponsesResponse {
            output,
            custom_outputs,
        })
    }
}
