use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::Instrument;

use crate::catalog::{tool_name, FunctionCatalog};
use crate::errors::{RegistrationError, ToolError, ToolResult};
use crate::models::tool::ToolSpec;
use crate::providers::utils::is_valid_function_name;

/// Something that can answer a tool call with text
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Map<String, Value>) -> ToolResult<String>;
}

#[async_trait]
impl<F> ToolHandler for F
where
    F: Fn(Map<String, Value>) -> ToolResult<String> + Send + Sync,
{
    async fn call(&self, arguments: Map<String, Value>) -> ToolResult<String> {
        self(arguments)
    }
}

/// A catalog function bound to its fully qualified name
struct CatalogFunction {
    catalog: Arc<dyn FunctionCatalog>,
    full_name: String,
}

#[async_trait]
impl ToolHandler for CatalogFunction {
    async fn call(&self, arguments: Map<String, Value>) -> ToolResult<String> {
        self.catalog
            .execute(&self.full_name, &arguments)
            .await
            .map(|result| result.into_display())
            .map_err(|e| ToolError::ExecutionError(format!("{:#}", e)))
    }
}

/// The set of tools offered to the model, fixed after construction.
///
/// Every tool name is unique, and every advertised spec has a handler.
#[derive(Default)]
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every catalog function and register it under its tool name.
    ///
    /// Names are resolved in order and the first failure aborts the build.
    pub async fn build(
        names: &[String],
        catalog: Arc<dyn FunctionCatalog>,
    ) -> Result<Self, RegistrationError> {
        let mut registry = Self::new();

        for full_name in names {
            let description = catalog.describe(full_name).await.map_err(|source| {
                RegistrationError::Unresolved {
                    name: full_name.clone(),
                    source,
                }
            })?;

            let mut spec = ToolSpec::from_function_spec(&description).map_err(|reason| {
                RegistrationError::InvalidSpec {
                    name: full_name.clone(),
                    reason,
                }
            })?;
            spec.name = tool_name(full_name);

            let handler = CatalogFunction {
                catalog: Arc::clone(&catalog),
                full_name: full_name.clone(),
            };
            registry.register(spec, Arc::new(handler))?;
            tracing::info!(function = %full_name, "registered catalog tool");
        }

        Ok(registry)
    }

    /// Add a locally implemented tool
    pub fn register(
        &mut self,
        spec: ToolSpec,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistrationError> {
        if !is_valid_function_name(&spec.name) {
            return Err(RegistrationError::InvalidSpec {
                name: spec.name.clone(),
                reason: "tool names must match [a-zA-Z0-9_-]+".to_string(),
            });
        }
        if self.handlers.contains_key(&spec.name) {
            return Err(RegistrationError::Duplicate(spec.name));
        }

        self.handlers.insert(spec.name.clone(), handler);
        self.specs.push(spec);
        Ok(())
    }

    /// Builder-style variant of [`ToolRegistry::register`]
    pub fn with_tool<H>(mut self, spec: ToolSpec, handler: H) -> Result<Self, RegistrationError>
    where
        H: ToolHandler + 'static,
    {
        self.register(spec, Arc::new(handler))?;
        Ok(self)
    }

    /// The advertised tool specs, in registration order
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Run the named tool.
    ///
    /// Only an unknown name is an error; anything the tool itself reports,
    /// failures included, comes back as display text for the model.
    pub async fn execute(&self, name: &str, arguments: Map<String, Value>) -> ToolResult<String> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let span = tracing::info_span!("tool", name = %name);
        let output = match handler.call(arguments).instrument(span).await {
            Ok(output) => output,
            Err(error) => {
                tracing::warn!(tool = %name, error = %error, "tool call failed");
                error.to_string()
            }
        };
        Ok(output)
    }
}
