// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema for a conductor node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Listener, handshake and request limits
// - SQLite catalog location
// - Container runtime connection and call timeouts
// - Pod lease, reaper and host port allocation policy
// - Guest access and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "conductor/v1";
pub const KIND: &str = "NodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "conductor/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "NodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: NodeConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub runtime: RuntimeSettings,

    #[serde(default)]
    pub pods: PodSettings,

    #[serde(default)]
    pub access: AccessConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Overrides the port stored in the settings record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,

    /// Host reported in `Address` responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_host: Option<String>,

    /// Ask public IP echo services when no advertise host is set
    #[serde(default = "default_true")]
    pub discover_public_ip: bool,

    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Docker socket path (None = local defaults)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket: Option<String>,

    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_network_driver")]
    pub network_driver: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSettings {
    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,

    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,

    /// Fresh probes after losing a host port bind race
    #[serde(default = "default_port_conflict_retries")]
    pub port_conflict_retries: u32,

    /// Horizon passed to the overdue sweep triggered by every start
    #[serde(default = "default_hours")]
    pub reaper_horizon_hours: u32,

    /// Lease forced on guest callers
    #[serde(default = "default_hours")]
    pub guest_lease_hours: u32,

    /// Periodic sweep in addition to the start-triggered one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_interval_minutes: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Unknown identities resolve to the guest role instead of unknown
    #[serde(default)]
    pub guest_access: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_request_bytes() -> usize {
    64 * 1024
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./conductor.db")
}

fn default_call_timeout() -> u64 {
    60
}

fn default_network_driver() -> String {
    "bridge".to_string()
}

fn default_port_range_start() -> u16 {
    1000
}

fn default_port_range_end() -> u16 {
    9999
}

fn default_port_conflict_retries() -> u32 {
    3
}

fn default_hours() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            listen_port: None,
            advertise_host: None,
            discover_public_ip: true,
            handshake_timeout_secs: default_handshake_timeout(),
            request_timeout_secs: default_request_timeout(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            docker_socket: None,
            call_timeout_secs: default_call_timeout(),
            network_driver: default_network_driver(),
        }
    }
}

impl Default for PodSettings {
    fn default() -> Self {
        Self {
            port_range_start: default_port_range_start(),
            port_range_end: default_port_range_end(),
            port_conflict_retries: default_port_conflict_retries(),
            reaper_horizon_hours: default_hours(),
            guest_lease_hours: default_hours(),
            sweep_interval_minutes: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "conductor-node".to_string(),
                labels: None,
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

impl NetworkConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RuntimeSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl NodeConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. CONDUCTOR_CONFIG_PATH environment variable
    /// 2. ./conductor-config.yaml (working directory)
    /// 3. ~/.conductor/config.yaml (user home)
    /// 4. /etc/conductor/config.yaml (system, Unix) or C:\ProgramData\Conductor\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CONDUCTOR_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./conductor-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".conductor").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/conductor/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Conductor\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // 1. Explicit CLI path (Fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        // 2. Discovery (Env -> Cwd -> Home -> System)
        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("CONDUCTOR_LISTEN_PORT") {
            match val.trim().parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: CONDUCTOR_LISTEN_PORT={}", port);
                    self.spec.network.listen_port = Some(port);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for CONDUCTOR_LISTEN_PORT: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("CONDUCTOR_DATABASE_PATH") {
            tracing::info!("Environment override: CONDUCTOR_DATABASE_PATH={}", val);
            self.spec.storage.database_path = PathBuf::from(val);
        }

        if let Some(val) = lookup("CONDUCTOR_ADVERTISE_HOST") {
            tracing::info!("Environment override: CONDUCTOR_ADVERTISE_HOST={}", val);
            self.spec.network.advertise_host = Some(val);
        }

        if let Some(val) = lookup("CONDUCTOR_DOCKER_SOCKET") {
            tracing::info!("Environment override: CONDUCTOR_DOCKER_SOCKET={}", val);
            self.spec.runtime.docker_socket = Some(val);
        }

        if let Some(val) = lookup("CONDUCTOR_GUEST_ACCESS") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: CONDUCTOR_GUEST_ACCESS=true");
                    self.spec.access.guest_access = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: CONDUCTOR_GUEST_ACCESS=false");
                    self.spec.access.guest_access = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for CONDUCTOR_GUEST_ACCESS: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let pods = &self.spec.pods;
        if pods.port_range_start == 0 || pods.port_range_start > pods.port_range_end {
            anyhow::bail!(
                "Invalid host port range {}-{}",
                pods.port_range_start,
                pods.port_range_end
            );
        }
        if pods.reaper_horizon_hours == 0 {
            anyhow::bail!("spec.pods.reaper_horizon_hours must be at least 1");
        }
        if pods.guest_lease_hours == 0 {
            anyhow::bail!("spec.pods.guest_lease_hours must be at least 1");
        }
        if pods.sweep_interval_minutes == Some(0) {
            anyhow::bail!("spec.pods.sweep_interval_minutes must be at least 1 when set");
        }

        let network = &self.spec.network;
        if network.handshake_timeout_secs == 0 || network.request_timeout_secs == 0 {
            anyhow::bail!("Network timeouts must be at least one second");
        }
        if network.max_request_bytes == 0 {
            anyhow::bail!("spec.network.max_request_bytes cannot be zero");
        }

        if self.spec.runtime.call_timeout_secs == 0 {
            anyhow::bail!("spec.runtime.call_timeout_secs cannot be zero");
        }

        match self.spec.observability.log_format.as_str() {
            "compact" | "json" => {}
            other => anyhow::bail!("Unknown log format '{}'. Supported: compact, json", other),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = NodeConfigManifest::default();
        assert_eq!(manifest.api_version, "conductor/v1");
        assert_eq!(manifest.kind, "NodeConfig");
        assert_eq!(manifest.spec.pods.port_range_start, 1000);
        assert_eq!(manifest.spec.pods.port_range_end, 9999);
        assert_eq!(manifest.spec.pods.guest_lease_hours, 3);
        assert!(!manifest.spec.access.guest_access);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
apiVersion: conductor/v1
kind: NodeConfig
metadata:
  name: edge-1
spec:
  network:
    listen_port: 4100
    advertise_host: pods.example.net
  access:
    guest_access: true
"#;
        let manifest = NodeConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "edge-1");
        assert_eq!(manifest.spec.network.listen_port, Some(4100));
        assert_eq!(manifest.spec.network.bind_address, "0.0.0.0");
        assert_eq!(manifest.spec.runtime.network_driver, "bridge");
        assert!(manifest.spec.access.guest_access);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut manifest = NodeConfigManifest::default();
        manifest.spec.pods.sweep_interval_minutes = Some(15);
        manifest.spec.runtime.docker_socket = Some("/var/run/docker.sock".to_string());

        let yaml = serde_yaml::to_string(&manifest).unwrap();
        let parsed = NodeConfigManifest::from_yaml_str(&yaml).unwrap();

        assert_eq!(parsed.spec.pods.sweep_interval_minutes, Some(15));
        assert_eq!(parsed.spec.runtime.docker_socket.as_deref(), Some("/var/run/docker.sock"));
    }

    #[test]
    fn test_env_overrides() {
        let mut manifest = NodeConfigManifest::default();
        let env = HashMap::from([
            ("CONDUCTOR_LISTEN_PORT", "5000"),
            ("CONDUCTOR_GUEST_ACCESS", "yes"),
            ("CONDUCTOR_DATABASE_PATH", "/tmp/node.db"),
        ]);
        manifest.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(manifest.spec.network.listen_port, Some(5000));
        assert!(manifest.spec.access.guest_access);
        assert_eq!(manifest.spec.storage.database_path, PathBuf::from("/tmp/node.db"));

        let bad = HashMap::from([("CONDUCTOR_LISTEN_PORT", "not-a-port")]);
        manifest.apply_overrides_from(|key| bad.get(key).map(|v| v.to_string()));
        assert_eq!(manifest.spec.network.listen_port, Some(5000));
    }

    #[test]
    fn test_validation() {
        let mut manifest = NodeConfigManifest::default();

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.pods.port_range_start = 5000;
        manifest.spec.pods.port_range_end = 4000;
        assert!(manifest.validate().is_err());
        manifest.spec.pods.port_range_end = 6000;
        assert!(manifest.validate().is_ok());

        manifest.spec.pods.reaper_horizon_hours = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.pods.reaper_horizon_hours = 3;

        manifest.spec.observability.log_format = "xml".to_string();
        assert!(manifest.validate().is_err());
    }
}
