//! tg-group-relay - CLI entry point.
//!
//! Loads configuration, connects the Telegram account and relays messages
//! until interrupted. The exit code tells a clean shutdown apart from
//! configuration, authentication and runtime failures.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tg_group_relay::agent::{self, Shutdown};
use tg_group_relay::cli::Cli;
use tg_group_relay::error::{RelayError, EXIT_CLEAN, EXIT_RUNTIME};
use tg_group_relay::messenger::telegram::TelegramConnector;
use tg_group_relay::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let _cli = Cli::parse();

    match run().await {
        Ok(shutdown) => {
            tracing::info!(?shutdown, "Shutdown complete");
            ExitCode::from(EXIT_CLEAN)
        }
        Err(err) => {
            let code = err
                .downcast_ref::<RelayError>()
                .map(RelayError::exit_code)
                .unwrap_or(EXIT_RUNTIME);
            tracing::error!("{:#}", err);
            ExitCode::from(code)
        }
    }
}

async fn run() -> Result<Shutdown> {
    let config = Config::load()
        .map_err(RelayError::from)
        .context("Failed to load configuration")?;

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    agent::run(Arc::new(config), &TelegramConnector, interrupt)
        .await
        .context("Relay agent failed")
}
