// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! User role management commands
//!
//! Commands: add, remove, list

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use conductor_core::domain::rbac::{PeerId, Role};
use conductor_core::domain::repository::{RepositoryError, UserRepository};
use conductor_core::infrastructure::repositories::SqliteUserRepository;

use super::{load_config, open_database};

/// Roles that can be granted to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Admin,
    User,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Role::Admin,
            RoleArg::User => Role::User,
        }
    }
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Grant a role to a peer
    Add {
        /// Peer id (hex public key)
        #[arg(value_name = "PEER_ID")]
        peer_id: String,

        #[arg(long, value_enum, default_value = "user")]
        role: RoleArg,
    },

    /// Revoke a role from a peer
    Remove {
        #[arg(value_name = "PEER_ID")]
        peer_id: String,

        #[arg(long, value_enum, default_value = "user")]
        role: RoleArg,
    },

    /// List every registered peer and role
    List,
}

pub async fn handle_command(command: UserCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let db = open_database(&config).await?;
    let users = SqliteUserRepository::new(db.get_pool().clone());

    match command {
        UserCommand::Add { peer_id, role } => add(&users, &peer_id, role.into()).await,
        UserCommand::Remove { peer_id, role } => remove(&users, &peer_id, role.into()).await,
        UserCommand::List => list(&users).await,
    }
}

fn parse_peer(raw: &str) -> Result<PeerId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        anyhow::bail!("Peer id cannot be empty");
    }
    Ok(PeerId::new(trimmed))
}

async fn add(users: &dyn UserRepository, peer_id: &str, role: Role) -> Result<()> {
    let peer = parse_peer(peer_id)?;
    match users.add(&peer, role).await {
        Ok(()) => {
            println!("{}", format!("✓ Granted {} to {}", role, peer).green());
            Ok(())
        }
        Err(RepositoryError::Duplicate(_)) => {
            println!("{}", format!("{} already has role {}", peer, role).yellow());
            Ok(())
        }
        Err(e) => Err(e).context("Failed to add user"),
    }
}

async fn remove(users: &dyn UserRepository, peer_id: &str, role: Role) -> Result<()> {
    let peer = parse_peer(peer_id)?;
    let removed = users
        .remove(&peer, role)
        .await
        .context("Failed to remove user")?;

    if removed {
        println!("{}", format!("✓ Revoked {} from {}", role, peer).green());
    } else {
        println!("{}", format!("{} does not have role {}", peer, role).yellow());
    }
    Ok(())
}

async fn list(users: &dyn UserRepository) -> Result<()> {
    let records = users.list().await.context("Failed to list users")?;

    if records.is_empty() {
        println!("{}", "No users registered".dimmed());
        return Ok(());
    }

    println!("{}", "Registered users:".bold());
    for record in records {
        println!(
            "  {:<6} {} {}",
            record.role.name(),
            record.peer_id,
            record.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_arg_conversion() {
        assert_eq!(Role::from(RoleArg::Admin), Role::Admin);
        assert_eq!(Role::from(RoleArg::User), Role::User);
    }

    #[test]
    fn test_parse_peer() {
        assert_eq!(parse_peer("  abc  ").unwrap(), PeerId::new("abc"));
        assert!(parse_peer(" ").is_err());
    }
}
