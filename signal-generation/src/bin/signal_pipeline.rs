//! Signal Pipeline
//!
//! Runs ingest -> score -> aggregate -> persist cycles until interrupted.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use signal_generation::{
    create_config_template, load_config, PersistentStore, PipelineOrchestrator, PipelineSettings, PipelineSources,
    SecretOverrides,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config/signal_pipeline.toml";

#[derive(Parser)]
#[command(name = "signal-pipeline")]
#[command(version, about = "Periodic market and social sentiment signal pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: config/signal_pipeline.toml when it exists)
    #[arg(short, long)]
    config: Option<String>,

    /// Social search bearer token (or set SOCIAL_BEARER_TOKEN env var)
    #[arg(long, env = "SOCIAL_BEARER_TOKEN", hide_env_values = true)]
    social_bearer_token: Option<String>,

    /// PostgreSQL URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Redis URL (or set REDIS_URL env var)
    #[arg(long, env = "REDIS_URL", hide_env_values = true)]
    redis_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run cycles on the configured interval (default)
    Run,

    /// Write a config template
    Init {
        /// Where to write the template
        #[arg(default_value = DEFAULT_CONFIG_PATH)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Some(Commands::Init { path }) = &cli.command {
        create_config_template(path).with_context(|| format!("Failed to write config template to {}", path))?;
        info!("📝 Wrote config template to {}", path);
        return Ok(());
    }

    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = match cli.config.as_deref() {
        Some(path) => load_config(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH)?,
        None => {
            warn!("No config file given, using defaults");
            PipelineSettings::default()
        }
    };
    settings.apply_overrides(SecretOverrides {
        social_bearer_token: cli.social_bearer_token,
        database_url: cli.database_url,
        redis_url: cli.redis_url,
    });

    info!("🚀 Starting Signal Pipeline");

    let sources = PipelineSources::from_settings(&settings)?;
    let mut orchestrator = PipelineOrchestrator::new(sources, &settings)?;

    match (&settings.storage.database_url, &settings.storage.redis_url) {
        (Some(database_url), Some(redis_url)) => {
            let store = PersistentStore::connect(database_url, redis_url).await?;
            orchestrator = orchestrator.with_store(Arc::new(store));
        }
        _ => warn!("DATABASE_URL or REDIS_URL not set, keeping signals in memory"),
    }

    orchestrator
        .run_forever(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("👋 Shutting down gracefully...");
        })
        .await
}
