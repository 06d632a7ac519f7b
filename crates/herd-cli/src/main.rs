//! Herd CLI - run and inspect device-side todo synchronization.

mod cli;
mod commands;
mod config;
mod error;
mod provider_file;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::config::ClientConfig;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("herd=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync { daemon, interval } => {
            let config = ClientConfig::resolve(cli.state_dir, cli.host_file)?;
            if daemon {
                commands::sync::run_sync_daemon(&config, interval).await?;
            } else {
                commands::sync::run_sync_once(&config).await?;
            }
        }
        Commands::Conflicts { limit, json } => {
            let state_dir = config::resolve_state_dir(cli.state_dir);
            commands::conflicts::run_conflicts(&state_dir, limit, json)?;
        }
        Commands::Doctor => {
            let state_dir = config::resolve_state_dir(cli.state_dir);
            commands::doctor::run_doctor(&state_dir)?;
        }
        Commands::Health => {
            let config = ClientConfig::resolve(cli.state_dir, cli.host_file)?;
            commands::health::run_health(&config).await?;
        }
        Commands::Reset { force } => {
            let config = ClientConfig::resolve(cli.state_dir, cli.host_file)?;
            commands::health::run_reset(&config, force).await?;
        }
    }

    Ok(())
}
