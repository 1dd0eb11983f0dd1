// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory container runtime and wiring helpers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use conductor_core::application::{
    Authorizer, OrchestratorConfig, PodOrchestrator, PodRegistry, PortAllocator,
};
use conductor_core::domain::instance::LeaseHours;
use conductor_core::domain::pod::PodDefinition;
use conductor_core::domain::rbac::{PeerId, Role, RoleTable};
use conductor_core::domain::repository::{PodCatalog, UserRepository};
use conductor_core::domain::runtime::{
    ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary, NetworkInfo, NetworkSpec,
    RuntimeError,
};
use conductor_core::infrastructure::repositories::{InMemoryPodCatalog, InMemoryUserRepository};
use conductor_core::presentation::dispatcher::{Dispatcher, RequestLimits};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub network: String,
    pub host_port: Option<u16>,
    pub running: bool,
}

#[derive(Default)]
struct State {
    images: HashSet<String>,
    networks: HashMap<String, NetworkInfo>,
    containers: HashMap<String, FakeContainer>,
    next_id: usize,
    failing_image: Option<String>,
    port_conflicts: usize,
    network_creations: usize,
}

/// Docker stand-in that keeps networks and containers in memory.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
}

impl FakeRuntime {
    pub fn with_images(images: &[&str]) -> Self {
        let runtime = Self::default();
        {
            let mut state = runtime.state.lock().unwrap();
            state.images = images.iter().map(|s| s.to_string()).collect();
            // daemon default network, never ours
            state.networks.insert(
                "bridge".to_string(),
                NetworkInfo {
                    name: "bridge".to_string(),
                    labels: HashMap::new(),
                    containers: vec![],
                },
            );
        }
        runtime
    }

    /// Starting a container of `image` fails from now on.
    pub fn fail_starts_of(&self, image: &str) {
        self.state.lock().unwrap().failing_image = Some(image.to_string());
    }

    /// The next `count` starts that publish a port lose the bind race.
    pub fn lose_port_races(&self, count: usize) {
        self.state.lock().unwrap().port_conflicts = count;
    }

    pub fn insert_network(&self, name: &str, labels: &[(&str, &str)]) {
        self.state.lock().unwrap().networks.insert(
            name.to_string(),
            NetworkInfo {
                name: name.to_string(),
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                containers: vec![],
            },
        );
    }

    pub fn network(&self, name: &str) -> Option<NetworkInfo> {
        self.state.lock().unwrap().networks.get(name).cloned()
    }

    pub fn network_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().unwrap().networks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn containers_of(&self, tenant: &str) -> Vec<FakeContainer> {
        let mut containers: Vec<FakeContainer> = self
            .state
            .lock()
            .unwrap()
            .containers
            .values()
            .filter(|c| c.labels.get("UniqueID").map(String::as_str) == Some(tenant))
            .cloned()
            .collect();
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        containers
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn network_creations(&self) -> usize {
        self.state.lock().unwrap().network_creations
    }
}

fn find_container<'a>(state: &'a State, key: &str) -> Option<&'a FakeContainer> {
    state
        .containers
        .get(key)
        .or_else(|| state.containers.values().find(|c| c.name == key))
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        Ok(self.state.lock().unwrap().images.contains(image))
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        if state.networks.contains_key(&spec.name) {
            return Err(RuntimeError::Conflict(format!("network {} already exists", spec.name)));
        }
        state.network_creations += 1;
        state.networks.insert(
            spec.name.clone(),
            NetworkInfo {
                name: spec.name.clone(),
                labels: spec.labels.clone(),
                containers: vec![],
            },
        );
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        match state.networks.get(name) {
            None => Err(RuntimeError::NotFound(format!("network {}", name))),
            Some(network) if !network.containers.is_empty() => {
                Err(RuntimeError::Api(format!("network {} has active endpoints", name)))
            }
            Some(_) => {
                state.networks.remove(name);
                Ok(())
            }
        }
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkInfo, RuntimeError> {
        self.state
            .lock()
            .unwrap()
            .networks
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(format!("network {}", name)))
    }

    async fn list_networks(&self) -> Result<Vec<NetworkInfo>, RuntimeError> {
        Ok(self.state.lock().unwrap().networks.values().cloned().collect())
    }

    async fn disconnect_network(&self, network: &str, container_id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        let name = find_container(&state, container_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| RuntimeError::NotFound(format!("container {}", container_id)))?;
        let network = state
            .networks
            .get_mut(network)
            .ok_or_else(|| RuntimeError::NotFound(format!("network {}", network)))?;
        network.containers.retain(|c| *c != name);
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        if state.containers.values().any(|c| c.name == spec.name) {
            return Err(RuntimeError::Conflict(format!("container name {} in use", spec.name)));
        }
        if !state.images.contains(&spec.image) {
            return Err(RuntimeError::NotFound(format!("image {}", spec.image)));
        }
        let network = state
            .networks
            .get_mut(&spec.network)
            .ok_or_else(|| RuntimeError::NotFound(format!("network {}", spec.network)))?;
        network.containers.push(spec.name.clone());

        state.next_id += 1;
        let id = format!("c{:04}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                name: spec.name.clone(),
                image: spec.image.clone(),
                env: spec.env.clone(),
                labels: spec.labels.clone(),
                network: spec.network.clone(),
                host_port: spec.port.map(|p| p.host_port),
                running: false,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        let (image, publishes) = match state.containers.get(id) {
            Some(c) => (c.image.clone(), c.host_port.is_some()),
            None => return Err(RuntimeError::NotFound(format!("container {}", id))),
        };
        if state.failing_image.as_deref() == Some(image.as_str()) {
            return Err(RuntimeError::Api(format!("{} exited immediately", image)));
        }
        if publishes && state.port_conflicts > 0 {
            state.port_conflicts -= 1;
            return Err(RuntimeError::PortConflict("port is already allocated".to_string()));
        }
        if let Some(container) = state.containers.get_mut(id) {
            container.running = true;
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .remove(id)
            .ok_or_else(|| RuntimeError::NotFound(format!("container {}", id)))?;
        for network in state.networks.values_mut() {
            network.containers.retain(|c| *c != container.name);
        }
        Ok(())
    }

    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let state = self.state.lock().unwrap();
        let mut summaries: Vec<ContainerSummary> = state
            .containers
            .values()
            .filter(|c| filter.all || c.running)
            .filter(|c| match &filter.label {
                Some((key, value)) => c.labels.get(key) == Some(value),
                None => true,
            })
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![format!("/{}", c.name)],
                image: c.image.clone(),
                state: if c.running { "running" } else { "created" }.to_string(),
                labels: c.labels.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    async fn published_ports(&self, container: &str) -> Result<Vec<u16>, RuntimeError> {
        let state = self.state.lock().unwrap();
        let container = find_container(&state, container)
            .ok_or_else(|| RuntimeError::NotFound(format!("container {}", container)))?;
        Ok(match (container.running, container.host_port) {
            (true, Some(port)) => vec![port],
            _ => vec![],
        })
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// `web` pod: nginx (external, port 80) plus redis.
pub fn web_pod() -> PodDefinition {
    PodDefinition::new("web", strings(&["nginx", "redis"]), "nginx", 80, strings(&["tier=front"]))
        .unwrap()
}

pub fn orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        network_driver: "bridge".to_string(),
        port_conflict_retries: 2,
        reaper_horizon: LeaseHours(3),
    }
}

pub fn port_allocator() -> PortAllocator {
    PortAllocator::new(20000, 29999)
}

pub struct Node {
    pub runtime: Arc<FakeRuntime>,
    pub catalog: Arc<InMemoryPodCatalog>,
    pub users: Arc<InMemoryUserRepository>,
    pub orchestrator: Arc<PodOrchestrator>,
    pub dispatcher: Dispatcher,
}

pub const ADMIN: &str = "admin-peer";
pub const USER: &str = "user-peer";
pub const STRANGER: &str = "stranger-peer";

/// Fully wired node over in-memory collaborators, with one admin and one user.
pub async fn node(guest_access: bool) -> Node {
    let runtime = Arc::new(FakeRuntime::with_images(&["nginx", "redis", "postgres"]));
    let catalog = Arc::new(InMemoryPodCatalog::new());
    let users = Arc::new(InMemoryUserRepository::new());
    users.add(&PeerId::new(ADMIN), Role::Admin).await.unwrap();
    users.add(&PeerId::new(USER), Role::User).await.unwrap();

    let authorizer = Arc::new(Authorizer::new(
        Arc::new(RoleTable::standard()),
        users.clone() as Arc<dyn UserRepository>,
        guest_access,
    ));
    let registry = Arc::new(PodRegistry::new(
        catalog.clone() as Arc<dyn PodCatalog>,
        runtime.clone() as Arc<dyn ContainerRuntime>,
    ));
    let orchestrator = Arc::new(PodOrchestrator::new(
        runtime.clone() as Arc<dyn ContainerRuntime>,
        catalog.clone() as Arc<dyn PodCatalog>,
        port_allocator(),
        orchestrator_config(),
    ));
    let dispatcher = Dispatcher::with_standard_routes(
        authorizer,
        registry,
        Arc::clone(&orchestrator),
        "198.51.100.4",
        LeaseHours(3),
        RequestLimits::default(),
    );

    Node {
        runtime,
        catalog,
        users,
        orchestrator,
        dispatcher,
    }
}
