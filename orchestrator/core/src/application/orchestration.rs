// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pod Orchestration Engine
//!
//! Drives the lifecycle of running instances against a [`ContainerRuntime`].
//! No state is cached: an instance is its isolation network plus the
//! containers labelled with its tenant id, and everything is read back from
//! the runtime on demand.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Collaborators:** `ContainerRuntime`, `PodCatalog`, `PortAllocator`,
//!   `TenantLocks`
//!
//! # Lifecycle
//!
//! ```text
//! absent --start--> starting --ok--> running --stop/reap--> absent
//!                      |
//!                      +--error (rolled back)--> absent
//! ```
//!
//! Start, Stop and reaping of one tenant are serialised by a per-tenant lock.
//! Operations on different tenants interleave freely.

use crate::application::port_allocator::{AllocationError, PortAllocator};
use crate::application::tenant_locks::TenantLocks;
use crate::domain::instance::{
    network_labels, LeaseHours, TenantId, LABEL_CONTAINER_TENANT, LABEL_CREATED, LABEL_HASH,
    LABEL_PORT,
};
use crate::domain::pod::{PodDefinition, PodHash};
use crate::domain::repository::{PodCatalog, RepositoryError};
use crate::domain::runtime::{
    ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary, NetworkSpec, PortMapping,
    RuntimeError,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("No pod with hash '{0}'")]
    PodNotFound(PodHash),

    #[error("No running instance for '{0}'")]
    InstanceNotFound(String),

    #[error("Host port allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Catalog error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub network_driver: String,
    /// Fresh port probes after the runtime reports a lost bind race.
    pub port_conflict_retries: u32,
    /// Horizon of the sweep triggered by every start.
    pub reaper_horizon: LeaseHours,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            network_driver: "bridge".to_string(),
            port_conflict_retries: 3,
            reaper_horizon: LeaseHours(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedInstance {
    pub tenant: TenantId,
    pub hash: PodHash,
    pub host_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceStatus {
    /// Hash label of the isolation network; empty when missing.
    pub hash: String,
    /// First published host port, `0` when none.
    pub port: u16,
}

pub struct PodOrchestrator {
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    catalog: Arc<dyn PodCatalog>,
    ports: PortAllocator,
    pub(crate) locks: TenantLocks,
    pub(crate) config: OrchestratorConfig,
}

impl PodOrchestrator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        catalog: Arc<dyn PodCatalog>,
        ports: PortAllocator,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            runtime,
            catalog,
            ports,
            locks: TenantLocks::new(),
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start `hash` for `tenant`, replacing any instance the tenant already has.
    ///
    /// An unknown hash fails before anything is torn down or created. A
    /// failure after the network exists removes whatever this call created.
    pub async fn start(
        self: &Arc<Self>,
        hash: &PodHash,
        tenant: &TenantId,
        lease: LeaseHours,
    ) -> Result<StartedInstance, OrchestrationError> {
        self.trigger_sweep();

        let _guard = self.locks.lock(tenant).await;

        let pod = self
            .catalog
            .find_by_hash(hash)
            .await?
            .ok_or_else(|| OrchestrationError::PodNotFound(hash.clone()))?;

        let replaced = self.stop_locked(tenant).await?;
        if replaced > 0 {
            info!(tenant = %tenant, containers = replaced, "Replaced existing instance");
        }

        match self.launch(&pod, tenant, lease).await {
            Ok(host_port) => {
                info!(tenant = %tenant, hash = %pod.hash, host_port, lease = %lease, "Started pod instance");
                Ok(StartedInstance {
                    tenant: tenant.clone(),
                    hash: pod.hash.clone(),
                    host_port,
                })
            }
            Err(e) => {
                warn!(tenant = %tenant, hash = %pod.hash, error = %e, "Start failed, rolling back");
                if let Err(cleanup) = self.stop_locked(tenant).await {
                    warn!(tenant = %tenant, error = %cleanup, "Rollback incomplete");
                }
                Err(e)
            }
        }
    }

    /// Remove every container of `tenant` and its isolation network.
    ///
    /// Stopping a tenant with no instance succeeds.
    pub async fn stop(&self, tenant: &TenantId) -> Result<(), OrchestrationError> {
        let _guard = self.locks.lock(tenant).await;
        let removed = self.stop_locked(tenant).await?;
        info!(tenant = %tenant, containers = removed, "Stopped pod instance");
        Ok(())
    }

    pub async fn status(&self, tenant: &TenantId) -> Result<InstanceStatus, OrchestrationError> {
        let network = match self.runtime.inspect_network(tenant.network_name()).await {
            Ok(network) => network,
            Err(RuntimeError::NotFound(_)) => {
                return Err(OrchestrationError::InstanceNotFound(tenant.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let hash = network.labels.get(LABEL_HASH).cloned().unwrap_or_default();

        let mut port = 0;
        for container in &network.containers {
            if let Some(first) = self.runtime.published_ports(container).await?.first() {
                port = *first;
                break;
            }
        }

        Ok(InstanceStatus { hash, port })
    }

    /// Live running containers, unfiltered.
    pub async fn list_running(&self) -> Result<Vec<ContainerSummary>, OrchestrationError> {
        Ok(self.runtime.list_containers(&ContainerFilter::running()).await?)
    }

    /// Caller must hold the tenant lock. Returns the number of containers removed.
    pub(crate) async fn stop_locked(&self, tenant: &TenantId) -> Result<usize, OrchestrationError> {
        let filter = ContainerFilter::with_label(LABEL_CONTAINER_TENANT, tenant.as_str());
        let containers = self.runtime.list_containers(&filter).await?;

        for container in &containers {
            if let Err(e) = self
                .runtime
                .disconnect_network(tenant.network_name(), &container.id)
                .await
            {
                debug!(container = %container.id, error = %e, "Disconnect skipped");
            }
            match self.runtime.remove_container(&container.id).await {
                Ok(()) | Err(RuntimeError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if let Err(e) = self.runtime.remove_network(tenant.network_name()).await {
            debug!(network = tenant.network_name(), error = %e, "Network removal ignored");
        }

        Ok(containers.len())
    }

    async fn launch(
        &self,
        pod: &PodDefinition,
        tenant: &TenantId,
        lease: LeaseHours,
    ) -> Result<u16, OrchestrationError> {
        let created = Utc::now();

        self.runtime
            .create_network(&NetworkSpec {
                name: tenant.network_name().to_string(),
                driver: self.config.network_driver.clone(),
                labels: network_labels(tenant, pod.hash.as_str(), created, lease),
            })
            .await?;

        let env = tenant.sibling_env(&pod.images);
        let mut host_port = None;

        for image in &pod.images {
            let spec = ContainerSpec {
                name: tenant.container_name(image),
                image: image.clone(),
                env: env.clone(),
                labels: HashMap::from([
                    (LABEL_CONTAINER_TENANT.to_string(), tenant.as_str().to_string()),
                    (LABEL_CREATED.to_string(), created.timestamp().to_string()),
                ]),
                network: tenant.network_name().to_string(),
                port: None,
            };

            if *image == pod.external_image {
                host_port = Some(self.launch_external(spec, pod.internal_port).await?);
            } else {
                self.create_and_start(&spec).await?;
            }
        }

        // PodDefinition guarantees the external image is listed
        host_port.ok_or_else(|| {
            OrchestrationError::Runtime(RuntimeError::Api(format!(
                "external image '{}' was not launched",
                pod.external_image
            )))
        })
    }

    async fn launch_external(
        &self,
        mut spec: ContainerSpec,
        internal_port: u16,
    ) -> Result<u16, OrchestrationError> {
        let mut conflicts = 0;
        loop {
            let reservation = self.ports.reserve()?;
            let host_port = reservation.port();
            spec.port = Some(PortMapping {
                container_port: internal_port,
                host_port,
            });
            spec.labels.insert(LABEL_PORT.to_string(), host_port.to_string());

            match self.create_and_start(&spec).await {
                Ok(_) => return Ok(host_port),
                Err(RuntimeError::PortConflict(msg)) if conflicts < self.config.port_conflict_retries => {
                    conflicts += 1;
                    warn!(host_port, attempt = conflicts, "Host port taken before bind ({}), retrying", msg);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// A container that fails to start is removed again so its name is free.
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let id = self.runtime.create_container(spec).await?;
        if let Err(e) = self.runtime.start_container(&id).await {
            if let Err(cleanup) = self.runtime.remove_container(&id).await {
                warn!(container = %spec.name, error = %cleanup, "Failed to remove unstarted container");
            }
            return Err(e);
        }
        debug!(container = %spec.name, image = %spec.image, "Container started");
        Ok(id)
    }
}
