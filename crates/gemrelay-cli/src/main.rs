//! gemrelay — Gemini relay service
//!
//! Usage:
//!   gemrelay serve [--host 0.0.0.0] [--port 8000] [--config PATH]
//!   gemrelay models [--api-key KEY]
//!
//! The process-wide fallback key comes from `GEMINI_API_KEY` (or the variable
//! named by `api_key_env` in the config). Without it the relay answers in
//! demo mode unless callers supply their own key.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use gemrelay_core::discovery::pick_model;
use gemrelay_core::{Dispatcher, GeminiClient, GenerativeBackend, RelayConfig};
use gemrelay_gateway::GatewayServer;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gemrelay", version, about = "Multi-tenant relay for the Gemini API")]
struct Cli {
    /// Path to a TOML config file (defaults to ~/.gemrelay/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP relay (default)
    Serve {
        /// Bind host, overrides the config
        #[arg(long)]
        host: Option<String>,
        /// Bind port, overrides the config
        #[arg(long)]
        port: Option<u16>,
    },
    /// List models available to a key and show which one discovery would pick
    Models {
        /// Key to query with; defaults to the fallback key from the environment
        #[arg(long)]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RelayConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => serve(config, host, port).await,
        Command::Models { api_key } => list_models(config, api_key).await,
    }
}

async fn serve(config: RelayConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let fallback_key = config.fallback_key_from_env();
    if fallback_key.is_none() {
        warn!(
            "{} is not set; requests without an api_key will be answered in demo mode",
            config.api_key_env
        );
    }

    info!(
        "gemrelay v{} starting (model: {})",
        env!("CARGO_PKG_VERSION"),
        config.provider.preferred_model
    );

    let client = GeminiClient::from_config(&config.provider)?;
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(client), config, fallback_key));

    GatewayServer::new(&host, port, dispatcher).run().await?;
    Ok(())
}

async fn list_models(config: RelayConfig, api_key: Option<String>) -> Result<()> {
    let Some(key) = api_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .or_else(|| config.fallback_key_from_env())
    else {
        bail!("No API key: pass --api-key or set {}", config.api_key_env);
    };

    let client = GeminiClient::from_config(&config.provider)?;
    let models = client.list_models(&key).await?;

    for model in &models {
        let marker = if model.supports_generate_content() {
            ""
        } else {
            " (no generateContent)"
        };
        println!("{}{}", model.name, marker);
    }

    match pick_model(&models) {
        Some(picked) => println!("\nDiscovery would pick: {picked}"),
        None => println!("\nNo model supports generateContent for this key"),
    }
    Ok(())
}
