//! Mender daemon - LLM-driven infrastructure remediation
//!
//! The daemon provides:
//! - Background health monitoring of configured resources
//! - Fix workflows: analyze, execute tools, verify, retry with feedback
//! - REST API for triggering fixes and inspecting evaluations, tools,
//!   analysis history, logs and resources

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mender_daemon::config::StorageConfig;
use mender_daemon::{DaemonConfig, Server};

/// Mender daemon CLI
#[derive(Parser)]
#[command(name = "menderd")]
#[command(about = "Mender daemon - LLM-driven infrastructure remediation", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MENDER_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides server.listen_addr)
    #[arg(short, long, env = "MENDER_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (overrides logging.level)
    #[arg(long, env = "MENDER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "MENDER_LOG_JSON")]
    json: bool,

    /// Keep evaluations in memory instead of the configured store
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        DaemonConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("Invalid listen address: {}", listen))?;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if cli.dev {
        config.storage = StorageConfig::Memory;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    println!(
        r#"
  Mender - infrastructure remediation daemon
  Version: {}
  Provider: {} ({})
  Listening: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.llm.provider,
        config.llm.model,
        config.server.listen_addr
    );

    let server = Server::new(config).await?;
    server.run().await?;
    Ok(())
}
