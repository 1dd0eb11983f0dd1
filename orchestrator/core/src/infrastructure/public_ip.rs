// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Public Address Discovery
//!
//! Works out the host placed in `Address` responses to `Start`. An explicit
//! `advertise_host` wins; otherwise public IP echo services are asked in
//! order, and the bind address is the last resort.

use crate::domain::node_config::NetworkConfig;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{info, warn};

const IFCONFIG_URL: &str = "https://ifconfig.co";
const IPIFY_URL: &str = "https://api.ipify.org/?format=json";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct IpifyResponse {
    ip: String,
}

fn parse_plain(body: &str) -> Option<IpAddr> {
    body.trim().parse().ok()
}

fn parse_ipify(body: &str) -> Option<IpAddr> {
    serde_json::from_str::<IpifyResponse>(body)
        .ok()
        .and_then(|response| response.ip.trim().parse().ok())
}

async fn fetch(client: &Client, url: &str, accept: &str) -> Result<String, reqwest::Error> {
    client
        .get(url)
        .header(reqwest::header::ACCEPT, accept)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

/// Ask the echo services for this host's public IP.
pub async fn discover_public_ip(client: &Client) -> Option<IpAddr> {
    match fetch(client, IFCONFIG_URL, "text/plain").await {
        Ok(body) => {
            if let Some(ip) = parse_plain(&body) {
                return Some(ip);
            }
            warn!("Unexpected response from {}", IFCONFIG_URL);
        }
        Err(e) => warn!("Public IP lookup via {} failed: {}", IFCONFIG_URL, e),
    }

    match fetch(client, IPIFY_URL, "application/json").await {
        Ok(body) => {
            let ip = parse_ipify(&body);
            if ip.is_none() {
                warn!("Unexpected response from {}", IPIFY_URL);
            }
            ip
        }
        Err(e) => {
            warn!("Public IP lookup via {} failed: {}", IPIFY_URL, e);
            None
        }
    }
}

fn fallback_host(bind_address: &str) -> String {
    match bind_address {
        "0.0.0.0" | "::" | "" => "127.0.0.1".to_string(),
        other => other.to_string(),
    }
}

/// Host to advertise to callers of `Start`.
pub async fn resolve_advertise_host(network: &NetworkConfig) -> String {
    if let Some(host) = &network.advertise_host {
        return host.clone();
    }

    if network.discover_public_ip {
        match Client::builder().timeout(LOOKUP_TIMEOUT).build() {
            Ok(client) => {
                if let Some(ip) = discover_public_ip(&client).await {
                    info!("Discovered public address {}", ip);
                    return ip.to_string();
                }
            }
            Err(e) => warn!("Failed to build HTTP client: {}", e),
        }
    }

    let host = fallback_host(&network.bind_address);
    warn!("Advertising fallback address {}", host);
    host
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_responses() {
        assert_eq!(parse_plain("203.0.113.7\n"), Some("203.0.113.7".parse().unwrap()));
        assert_eq!(parse_plain("<html>"), None);
        assert_eq!(
            parse_ipify(r#"{"ip":"2001:db8::1"}"#),
            Some("2001:db8::1".parse().unwrap())
        );
        assert_eq!(parse_ipify(r#"{"address":"1.2.3.4"}"#), None);
    }

    #[tokio::test]
    async fn test_advertise_host_precedence() {
        let mut network = NetworkConfig {
            advertise_host: Some("pods.example.net".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_advertise_host(&network).await, "pods.example.net");

        network.advertise_host = None;
        network.discover_public_ip = false;
        assert_eq!(resolve_advertise_host(&network).await, "127.0.0.1");

        network.bind_address = "10.0.0.5".to_string();
        assert_eq!(resolve_advertise_host(&network).await, "10.0.0.5");
    }
}
