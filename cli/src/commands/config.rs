// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use conductor_core::domain::node_config::NodeConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path (default: ./conductor-config.yaml)
        #[arg(short, long, default_value = "./conductor-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(output, force).await,
    }
}

fn or_unset(value: Option<String>) -> String {
    value.unwrap_or_else(|| "(not set)".dimmed().to_string())
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. CONDUCTOR_CONFIG_PATH: {}",
            or_unset(std::env::var("CONDUCTOR_CONFIG_PATH").ok())
        );
        println!("  3. ./conductor-config.yaml");
        println!("  4. ~/.conductor/config.yaml");
        println!("  5. /etc/conductor/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Network:".bold());
    println!("  Bind address: {}", spec.network.bind_address);
    println!(
        "  Listen port: {}",
        or_unset(spec.network.listen_port.map(|p| p.to_string()))
    );
    println!("  Advertise host: {}", or_unset(spec.network.advertise_host.clone()));
    println!("  Discover public IP: {}", spec.network.discover_public_ip);
    println!(
        "  Timeouts: handshake {}s, request {}s",
        spec.network.handshake_timeout_secs, spec.network.request_timeout_secs
    );
    println!("  Max request: {} bytes", spec.network.max_request_bytes);
    println!();

    println!("{}", "Storage:".bold());
    println!("  Database: {}", spec.storage.database_path.display());
    println!();

    println!("{}", "Runtime:".bold());
    println!("  Docker socket: {}", or_unset(spec.runtime.docker_socket.clone()));
    println!("  Call timeout: {}s", spec.runtime.call_timeout_secs);
    println!("  Network driver: {}", spec.runtime.network_driver);
    println!();

    println!("{}", "Pods:".bold());
    println!(
        "  Host ports: {}-{} ({} conflict retries)",
        spec.pods.port_range_start, spec.pods.port_range_end, spec.pods.port_conflict_retries
    );
    println!("  Reaper horizon: {}h", spec.pods.reaper_horizon_hours);
    println!("  Guest lease: {}h", spec.pods.guest_lease_hours);
    println!(
        "  Periodic sweep: {}",
        or_unset(spec.pods.sweep_interval_minutes.map(|m| format!("every {}m", m)))
    );
    println!();

    println!("{}", "Access:".bold());
    println!("  Guest access: {}", spec.access.guest_access);
    println!();

    println!("{}", "Observability:".bold());
    println!(
        "  Logging: {} ({})",
        spec.observability.log_level, spec.observability.log_format
    );

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", output.display());
    }

    NodeConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_writes_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("conductor-config.yaml");

        generate(output.clone(), false).await.unwrap();
        let config = NodeConfigManifest::from_yaml_file(&output).unwrap();
        config.validate().unwrap();

        assert!(generate(output.clone(), false).await.is_err());
        generate(output, true).await.unwrap();
    }
}
