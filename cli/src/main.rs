// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # conductor
//!
//! The `conductor` binary runs a pod node and administers it.
//!
//! ## Commands
//!
//! - `conductor serve` - Run the node: listener, dispatcher, orchestration engine
//! - `conductor user add|remove|list` - Manage user roles in the local catalog
//! - `conductor identity node|client` - Print node or client peer ids
//! - `conductor config show|validate|generate` - Configuration management
//! - `conductor request` - Send one XML request to a node and print the response

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use conductor_cli::commands::{self, ConfigCommand, IdentityCommand, RequestArgs, UserCommand};
use conductor_core::domain::node_config::NodeConfigManifest;

/// conductor - Docker pod orchestration over an authenticated peer protocol
#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CONDUCTOR_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "CONDUCTOR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (compact, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node until Ctrl+C or SIGTERM
    #[command(name = "serve")]
    Serve,

    /// Manage user roles
    #[command(name = "user")]
    User {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Show peer identities
    #[command(name = "identity")]
    Identity {
        #[command(subcommand)]
        command: Option<IdentityCommand>,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Send one request to a node
    #[command(name = "request")]
    Request {
        #[command(flatten)]
        args: RequestArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configured observability settings, unless overridden on the command line
    let observability = NodeConfigManifest::load_or_default(cli.config.clone())
        .map(|config| config.spec.observability)
        .unwrap_or_default();
    init_logging(
        cli.log_level.as_deref().unwrap_or(&observability.log_level),
        cli.log_format.as_deref().unwrap_or(&observability.log_format),
    )?;

    match cli.command {
        Commands::Serve => commands::serve::run(cli.config).await,
        Commands::User { command } => commands::user::handle_command(command, cli.config).await,
        Commands::Identity { command } => {
            commands::identity::handle_command(command.unwrap_or_default(), cli.config).await
        }
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
        Commands::Request { args } => commands::request::run(args).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        other => anyhow::bail!(
            "Unknown log format '{}'; expected 'compact' or 'json'",
            other
        ),
    }

    Ok(())
}
