// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Isolation network to create for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub labels: HashMap<String, String>,
}

/// Network as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub name: String,
    pub labels: HashMap<String, String>,
    /// Names of attached containers.
    pub containers: Vec<String>,
}

/// Host port published for a container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

/// Everything needed to create one pod container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Network the container is attached to at creation.
    pub network: String,
    pub port: Option<PortMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub state: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFilter {
    /// Include stopped containers
    pub all: bool,
    /// Only containers carrying this `key=value` label
    pub label: Option<(String, String)>,
}

impl ContainerFilter {
    pub fn running() -> Self {
        Self::default()
    }

    pub fn with_label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            all: true,
            label: Some((key.into(), value.into())),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to connect to container runtime: {0}")]
    Connection(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    Conflict(String),
    #[error("Host port already allocated: {0}")]
    PortConflict(String),
    #[error("Runtime call '{0}' timed out")]
    Timeout(String),
    #[error("Runtime call failed: {0}")]
    Api(String),
}

/// Container runtime primitives used by the orchestration engine.
///
/// Implementations must be safe for concurrent use; the engine serialises
/// calls per tenant but not across tenants.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    async fn create_network(&self, spec: &NetworkSpec) -> Result<(), RuntimeError>;
    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError>;
    /// `RuntimeError::NotFound` when no such network exists.
    async fn inspect_network(&self, name: &str) -> Result<NetworkInfo, RuntimeError>;
    async fn list_networks(&self) -> Result<Vec<NetworkInfo>, RuntimeError>;
    async fn disconnect_network(&self, network: &str, container_id: &str) -> Result<(), RuntimeError>;

    /// Create a container and return its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;
    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;
    /// Force-remove a container together with its volumes.
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>, RuntimeError>;
    /// Host ports published by a container, ascending.
    async fn published_ports(&self, container: &str) -> Result<Vec<u16>, RuntimeError>;
}
