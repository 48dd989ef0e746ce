mod configuration;
mod error;
mod routes;
mod state;

use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uc_agent::agent::Agent;

/// Overrides the `./config.yaml` default
const CONFIG_FILE_ENV: &str = "UC_AGENT_CONFIG_FILE";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
    let settings = configuration::Settings::new(config_path.as_deref())?;

    // Tool resolution failures abort startup
    let agent = Agent::from_settings(&settings.agent).await?;
    let state = state::AppState::new(agent);

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(settings.server.socket_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
