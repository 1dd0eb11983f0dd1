// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Send one XML request to a node and print the response.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use conductor_core::presentation::transport;

use super::identity::load_client_identity;

#[derive(Args)]
pub struct RequestArgs {
    /// Node address (HOST:PORT)
    #[arg(long, value_name = "HOST:PORT")]
    pub node: String,

    /// Client key file (default: ~/.conductor/client.key, generated if absent)
    #[arg(long, value_name = "FILE")]
    pub key: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Request file; `-` or absent reads stdin
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,
}

fn read_body(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) if path.as_os_str() != "-" => {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        _ => {
            let mut body = Vec::new();
            std::io::stdin()
                .read_to_end(&mut body)
                .context("Failed to read request from stdin")?;
            Ok(body)
        }
    }
}

pub async fn run(args: RequestArgs) -> Result<()> {
    let identity = load_client_identity(args.key)?;
    let body = read_body(args.file.as_ref())?;
    if body.iter().all(u8::is_ascii_whitespace) {
        anyhow::bail!("Request body is empty");
    }

    eprintln!(
        "{}",
        format!("Sending request to {} as {}", args.node, identity.peer_id()).dimmed()
    );

    let response = transport::request(
        &args.node,
        &identity,
        &body,
        Duration::from_secs(args.timeout),
    )
    .await
    .with_context(|| format!("Request to {} failed", args.node))?;

    if response.is_empty() {
        anyhow::bail!("Node closed the stream without a response (handshake rejected?)");
    }
    println!("{}", response);
    Ok(())
}
