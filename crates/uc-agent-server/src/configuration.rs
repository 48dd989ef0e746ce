use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use uc_agent::config::{self as agent_config, ConfigError};

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Server settings plus the agent settings read from the same sources
#[derive(Debug)]
pub struct Settings {
    pub server: ServerSettings,
    pub agent: agent_config::Settings,
}

impl Settings {
    pub fn new(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = agent_config::load(path)?;

        let server = match config.get::<ServerSettings>("server") {
            Ok(server) => server,
            Err(config::ConfigError::NotFound(_)) => ServerSettings::default(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            server,
            agent: agent_config::Settings::from_config(&config)?,
        })
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("UC_AGENT_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "databricks_configs:\n  catalog: main\n  schema: default").unwrap();

        let settings = Settings::new(Some(file.path())).unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.agent.databricks_configs.catalog.as_deref(), Some("main"));
    }

    #[test]
    #[serial]
    fn test_server_section_and_environment_override() {
        clean_env();
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "server:\n  host: 0.0.0.0\n  port: 9000").unwrap();
        env::set_var("UC_AGENT_SERVER__PORT", "8081");

        let settings = Settings::new(Some(file.path())).unwrap();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8081);

        // Clean up
        env::remove_var("UC_AGENT_SERVER__PORT");
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }
}
