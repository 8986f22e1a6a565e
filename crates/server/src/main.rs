use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

mod api;
mod config;
mod middleware;

use config::{AppState, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "toolhost")]
#[command(about = "Weather, recipe and grocery tools served over HTTP", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "TOOLHOST_CONFIG", default_value = "toolhost.toml")]
    config: PathBuf,

    /// Port to listen on
    #[arg(short, long, env = "TOOLHOST_PORT", default_value = "2022")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "TOOLHOST_HOST", default_value = "127.0.0.1")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "toolhost=info,toolhost_core=info,toolhost_tools=info,tower_http=debug".into()
            }),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args = Args::parse();

    tracing::info!("Starting Toolhost");
    tracing::info!("Configuration file: {}", args.config.display());

    // Load configuration
    let config = ServerConfig::load(&args.config)?;
    let state = AppState::new(&config).context("Failed to build tool service")?;

    // Start API server
    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!("Starting API server on {}", addr);

    api::serve(&addr, state).await?;

    Ok(())
}
