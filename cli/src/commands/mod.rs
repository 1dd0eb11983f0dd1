// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for conductor CLI

pub mod config;
pub mod identity;
pub mod request;
pub mod serve;
pub mod user;

pub use self::config::ConfigCommand;
pub use self::identity::IdentityCommand;
pub use self::request::RequestArgs;
pub use self::user::UserCommand;

use anyhow::{Context, Result};
use conductor_core::domain::node_config::NodeConfigManifest;
use conductor_core::infrastructure::db::Database;
use std::path::PathBuf;

/// Load and validate the node configuration.
pub fn load_config(config_path: Option<PathBuf>) -> Result<NodeConfigManifest> {
    let config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

/// Open the node catalog named by the configuration.
pub async fn open_database(config: &NodeConfigManifest) -> Result<Database> {
    let path = &config.spec.storage.database_path;
    Database::open(path)
        .await
        .with_context(|| format!("Failed to open catalog at {}", path.display()))
}
