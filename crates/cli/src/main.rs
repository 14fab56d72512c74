// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! cg - operator CLI for the cg task scheduling daemon

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod completions;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use cg_daemon::DaemonConfig;
use clap::{Parser, Subcommand};
use commands::{daemon, task};

use crate::client::{ClientError, DaemonClient};
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "cg", version, about = "cg - scheduled task runner")]
struct Cli {
    /// Daemon configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Task management
    Task(task::TaskArgs),
    /// Daemon management
    Daemon(daemon::DaemonArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let format = OutputFormat::from_json_flag(cli.json);

    if let Commands::Completions(args) = &cli.command {
        completions::generate_completions::<Cli>(args.shell);
        return Ok(());
    }

    let config = DaemonConfig::load(cli.config.as_deref())?;
    tracing::debug!(socket = %config.socket_path.display(), "resolved daemon config");

    match cli.command {
        Commands::Daemon(args) => {
            daemon::handle(args.command, &config, cli.config.as_deref(), format).await
        }
        Commands::Task(args) => {
            let client = DaemonClient::connect_or_start(&config, cli.config.as_deref())
                .map_err(|e| match e {
                    ClientError::DaemonStartFailed(_) | ClientError::DaemonStartTimeout => {
                        anyhow::anyhow!("{} (log: {})", e, config.log_path.display())
                    }
                    other => other.into(),
                })?;
            task::handle(args.command, &client, format).await
        }
        Commands::Completions(_) => Ok(()),
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("CG_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
