//! Startup configuration.
//!
//! Everything is read once, layered from `config.yaml` and `UC_AGENT_*`
//! environment variables, and then frozen into [`AgentConfig`] and
//! [`WorkspaceConfig`] which are shared by reference for the life of the
//! process.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const ENV_PREFIX: &str = "UC_AGENT";
pub const DEFAULT_ENDPOINT: &str = "databricks-claude-sonnet-4";
pub const DEFAULT_MAX_TURNS: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting, set it in the config file or export {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Name of the environment variable that overrides a dotted config key
pub fn to_env_var(field: &str) -> String {
    format!(
        "{}_{}",
        ENV_PREFIX,
        field.replace('.', "__").to_uppercase()
    )
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabricksSettings {
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    /// SQL warehouse used to execute Unity Catalog functions
    #[serde(default)]
    pub warehouse_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_endpoint")]
    pub llm_endpoint_name: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            llm_endpoint_name: default_endpoint(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_tool_catalog_names")]
    pub tool_catalog_names: Vec<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            prompt: String::new(),
            max_turns: default_max_turns(),
            tool_catalog_names: default_tool_catalog_names(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub databricks_configs: DatabricksSettings,
    #[serde(default)]
    pub agent_configs: AgentSettings,
}

/// The immutable agent configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub llm_endpoint_name: String,
    /// System prompt, prepended once when present
    pub prompt: Option<String>,
    pub max_turns: usize,
    pub tool_catalog_names: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm_endpoint_name: default_endpoint(),
            prompt: None,
            max_turns: DEFAULT_MAX_TURNS,
            tool_catalog_names: default_tool_catalog_names(),
        }
    }
}

/// Where and how to reach the Databricks workspace
#[derive(Clone, PartialEq)]
pub struct WorkspaceConfig {
    pub host: String,
    pub token: String,
    pub warehouse_id: Option<String>,
}

impl std::fmt::Debug for WorkspaceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceConfig")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("warehouse_id", &self.warehouse_id)
            .finish()
    }
}

/// Build the layered configuration source: the YAML file (optional) under
/// `UC_AGENT_*` environment overrides.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).format(FileFormat::Yaml).required(true),
        None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false),
    };

    let config = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("agent_configs.tool_catalog_names")
                .try_parsing(true),
        )
        .build()?;
    Ok(config)
}

impl Settings {
    /// Load settings from `path`, or `./config.yaml` when it exists
    pub fn new(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_config(&load(path)?)
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let result: Result<Self, config::ConfigError> = config.clone().try_deserialize();
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }

    pub fn agent_config(&self) -> Result<AgentConfig, ConfigError> {
        let agent = &self.agent_configs;
        if agent.max_turns == 0 {
            return Err(ConfigError::Invalid {
                key: "agent_configs.max_turns".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if agent.llm.llm_endpoint_name.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("agent_configs.llm.llm_endpoint_name"),
            });
        }

        let prompt = Some(agent.prompt.trim())
            .filter(|prompt| !prompt.is_empty())
            .map(String::from);

        Ok(AgentConfig {
            llm_endpoint_name: agent.llm.llm_endpoint_name.clone(),
            prompt,
            max_turns: agent.max_turns,
            tool_catalog_names: agent.tool_catalog_names.clone(),
        })
    }

    /// Resolve workspace credentials from `DATABRICKS_HOST` / `DATABRICKS_TOKEN`,
    /// falling back to `databricks_configs.host` for the host.
    pub fn workspace_config(&self) -> Result<WorkspaceConfig, ConfigError> {
        let host = non_empty_env("DATABRICKS_HOST")
            .or_else(|| self.databricks_configs.host.clone())
            .ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: "DATABRICKS_HOST".to_string(),
            })?;
        let token = non_empty_env("DATABRICKS_TOKEN").ok_or_else(|| ConfigError::MissingEnvVar {
            env_var: "DATABRICKS_TOKEN".to_string(),
        })?;

        Ok(WorkspaceConfig {
            host: normalize_host(&host),
            token,
            warehouse_id: self.databricks_configs.warehouse_id.clone(),
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Hosts are accepted with or without scheme and trailing slash
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

fn default_tool_catalog_names() -> Vec<String> {
    vec!["system.ai.python_exec".to_string()]
}
