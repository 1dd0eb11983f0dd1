// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Identity commands
//!
//! Commands: node, client

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use conductor_core::infrastructure::identity::{load_or_init_node, NodeIdentity};
use conductor_core::infrastructure::repositories::SqliteSettingsRepository;

use super::{load_config, open_database};

#[derive(Subcommand, Default)]
pub enum IdentityCommand {
    /// Print the node peer id, discovery id and listen port (initialises them on first use)
    #[default]
    Node,

    /// Print the peer id of a client key, generating the key if absent
    Client {
        /// Key file (default: ~/.conductor/client.key)
        #[arg(long, value_name = "FILE")]
        key: Option<PathBuf>,
    },
}

pub async fn handle_command(command: IdentityCommand, config_path: Option<PathBuf>) -> Result<()> {
    match command {
        IdentityCommand::Node => node(config_path).await,
        IdentityCommand::Client { key } => client(key),
    }
}

async fn node(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let db = open_database(&config).await?;
    let settings = SqliteSettingsRepository::new(db.get_pool().clone());

    let (identity, stored) = load_or_init_node(&settings)
        .await
        .context("Failed to load node identity")?;
    let port = config.spec.network.listen_port.unwrap_or(stored.listen_port);

    println!("{}", "Node Identity:".bold());
    println!("  Peer ID: {}", identity.peer_id());
    println!("  Discovery ID: {}", stored.discovery_id);
    println!("  Listen port: {}", port);
    Ok(())
}

/// Default location of the key used by `conductor request`.
pub fn default_client_key() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot determine home directory; pass --key")?;
    Ok(home.join(".conductor").join("client.key"))
}

/// Load the client key at `path` (or the default location), generating it if absent.
pub fn load_client_identity(path: Option<PathBuf>) -> Result<NodeIdentity> {
    let path = match path {
        Some(path) => path,
        None => default_client_key()?,
    };
    NodeIdentity::load_or_generate(&path)
        .with_context(|| format!("Failed to load client key {}", path.display()))
}

fn client(key: Option<PathBuf>) -> Result<()> {
    let identity = load_client_identity(key)?;
    println!("{}", "Client Identity:".bold());
    println!("  Peer ID: {}", identity.peer_id());
    Ok(())
}
