//! # Gamutmask
//!
//! Command-line entry point. See the library crate for the moving parts.

use anyhow::Context;
use clap::Parser;
use gamutmask::{Cli, ConfigLoader, app};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,notify=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    let config = loader.load(&cli).context("failed to load configuration")?;

    let shutdown = CancellationToken::new();
    let signals = tokio::spawn(app::forward_shutdown_signals(shutdown.clone()));

    let outcome = app::run(config, shutdown).await;
    signals.abort();
    outcome
}
