use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands {
    pub mod configure;
    pub mod predict;
    pub mod stream;
    pub mod version;
}

use commands::{configure, predict, stream, version};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./config.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Point the agent at a Unity Catalog schema
    Configure {
        /// Catalog holding the agent's functions
        #[arg(long, default_value = configure::DEFAULT_CATALOG)]
        catalog: String,

        /// Schema holding the agent's functions
        #[arg(long, default_value = configure::DEFAULT_SCHEMA)]
        schema: String,
    },

    /// Ask the agent once and print the full response as JSON
    Predict {
        /// The user message
        text: String,
    },

    /// Ask the agent once and print every event as it arrives
    Stream {
        /// The user message
        text: String,
    },

    /// Print the version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Configure { catalog, schema } => {
            let path = cli
                .config
                .unwrap_or_else(|| PathBuf::from(uc_agent::config::DEFAULT_CONFIG_FILE));
            configure::execute(&path, &catalog, &schema)
        }
        Command::Predict { text } => predict::execute(cli.config.as_deref(), text).await,
        Command::Stream { text } => stream::execute(cli.config.as_deref(), text).await,
        Command::Version => version::execute(),
    }
}
