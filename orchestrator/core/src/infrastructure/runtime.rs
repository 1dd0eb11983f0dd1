// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::runtime::{
    ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary, NetworkInfo, NetworkSpec,
    RuntimeError,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::models::{HostConfig, Network, PortBinding};
use bollard::network::{
    CreateNetworkOptions, DisconnectNetworkOptions, InspectNetworkOptions, ListNetworksOptions,
};
use bollard::Docker;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

pub struct DockerRuntime {
    docker: Docker,
    call_timeout: Duration,
}

impl DockerRuntime {
    pub fn new(socket_path: Option<String>, call_timeout: Duration) -> Result<Self, RuntimeError> {
        // Connect to Docker daemon (custom socket or auto-detect)
        let docker = if let Some(path) = socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(&path, 120, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| RuntimeError::Connection(format!(
                "Failed to connect to Docker at {}: {}\n\n\
                 Ensure Docker is running and the socket path is correct.",
                path, e
            )))?
        } else {
            Docker::connect_with_local_defaults()
                .map_err(|e| RuntimeError::Connection(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket\n\
                     - On Linux: Current user not in 'docker' group",
                    e
                )))?
        };

        Ok(Self { docker, call_timeout })
    }

    /// Verify Docker daemon is accessible
    pub async fn healthcheck(&self) -> Result<(), RuntimeError> {
        self.call("ping", self.docker.ping()).await.map_err(|e| {
            RuntimeError::Connection(format!(
                "Cannot connect to Docker daemon: {}\n\nVerify with: docker ps",
                e
            ))
        })?;
        Ok(())
    }

    /// Run one Docker API call under the configured deadline.
    async fn call<T, F>(&self, op: &str, fut: F) -> Result<T, RuntimeError>
    where
        F: Future<Output = Result<T, DockerError>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result.map_err(|e| map_docker_error(op, e)),
            Err(_) => Err(RuntimeError::Timeout(op.to_string())),
        }
    }
}

fn map_docker_error(op: &str, err: DockerError) -> RuntimeError {
    match err {
        DockerError::DockerResponseServerError { status_code: 404, message } => {
            RuntimeError::NotFound(message)
        }
        DockerError::DockerResponseServerError { status_code: 409, message } => {
            RuntimeError::Conflict(message)
        }
        DockerError::DockerResponseServerError { message, .. }
            if message.contains("port is already allocated")
                || message.contains("address already in use") =>
        {
            RuntimeError::PortConflict(message)
        }
        other => RuntimeError::Api(format!("{}: {}", op, other)),
    }
}

fn network_info(network: Network) -> NetworkInfo {
    NetworkInfo {
        name: network.name.unwrap_or_default(),
        labels: network.labels.unwrap_or_default(),
        containers: network
            .containers
            .unwrap_or_default()
            .into_values()
            .filter_map(|c| c.name)
            .collect(),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        match self.call("inspect_image", self.docker.inspect_image(image)).await {
            Ok(_) => Ok(true),
            Err(RuntimeError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<(), RuntimeError> {
        let options = CreateNetworkOptions {
            name: spec.name.clone(),
            driver: spec.driver.clone(),
            labels: spec.labels.clone(),
            ..Default::default()
        };
        self.call("create_network", self.docker.create_network(options)).await?;
        debug!("Created network {}", spec.name);
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.call("remove_network", self.docker.remove_network(name)).await
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkInfo, RuntimeError> {
        let network = self
            .call(
                "inspect_network",
                self.docker.inspect_network(name, None::<InspectNetworkOptions<String>>),
            )
            .await?;
        Ok(network_info(network))
    }

    async fn list_networks(&self) -> Result<Vec<NetworkInfo>, RuntimeError> {
        let networks = self
            .call(
                "list_networks",
                self.docker.list_networks(None::<ListNetworksOptions<String>>),
            )
            .await?;
        Ok(networks.into_iter().map(network_info).collect())
    }

    async fn disconnect_network(&self, network: &str, container_id: &str) -> Result<(), RuntimeError> {
        let options = DisconnectNetworkOptions {
            container: container_id.to_string(),
            force: true,
        };
        self.call("disconnect_network", self.docker.disconnect_network(network, options))
            .await
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let mut host_config = HostConfig {
            network_mode: Some(spec.network.clone()),
            ..Default::default()
        };
        let mut exposed_ports = None;

        if let Some(mapping) = spec.port {
            let key = format!("{}/tcp", mapping.container_port);
            host_config.port_bindings = Some(HashMap::from([(
                key.clone(),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(mapping.host_port.to_string()),
                }]),
            )]));
            exposed_ports = Some(HashMap::from([(key, HashMap::new())]));
        }

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports,
            host_config: Some(host_config),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .call("create_container", self.docker.create_container(Some(options), config))
            .await?;
        info!("Created container {} ({})", spec.name, response.id);
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.call(
            "start_container",
            self.docker.start_container(id, None::<StartContainerOptions<String>>),
        )
        .await
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.call("remove_container", self.docker.remove_container(id, Some(options)))
            .await?;
        debug!("Removed container {}", id);
        Ok(())
    }

    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let mut filters = HashMap::new();
        if let Some((key, value)) = &filter.label {
            filters.insert("label".to_string(), vec![format!("{}={}", key, value)]);
        }
        let options = ListContainersOptions {
            all: filter.all,
            filters,
            ..Default::default()
        };

        let containers = self
            .call("list_containers", self.docker.list_containers(Some(options)))
            .await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                names: c.names.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: c.state.unwrap_or_default(),
                labels: c.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn published_ports(&self, container: &str) -> Result<Vec<u16>, RuntimeError> {
        let inspect = self
            .call(
                "inspect_container",
                self.docker.inspect_container(container, None::<InspectContainerOptions>),
            )
            .await?;

        let mut ports: Vec<u16> = inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .unwrap_or_default()
            .into_values()
            .flatten()
            .flatten()
            .filter_map(|binding| binding.host_port)
            .filter_map(|port| port.parse().ok())
            .collect();
        ports.sort_unstable();
        ports.dedup();
        Ok(ports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error(status_code: u16, message: &str) -> DockerError {
        DockerError::DockerResponseServerError {
            status_code,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            map_docker_error("inspect_network", server_error(404, "network user123 not found")),
            RuntimeError::NotFound(_)
        ));
        assert!(matches!(
            map_docker_error("create_network", server_error(409, "network with name user123 already exists")),
            RuntimeError::Conflict(_)
        ));
        assert!(matches!(
            map_docker_error(
                "start_container",
                server_error(500, "driver failed programming external connectivity: Bind for 0.0.0.0:4242 failed: port is already allocated")
            ),
            RuntimeError::PortConflict(_)
        ));
        assert!(matches!(
            map_docker_error("start_container", server_error(500, "boom")),
            RuntimeError::Api(msg) if msg.starts_with("start_container")
        ));
    }

    #[test]
    fn test_network_info_conversion() {
        let network = Network {
            name: Some("user123".to_string()),
            labels: Some(HashMap::from([("Hash".to_string(), "abc".to_string())])),
            containers: Some(HashMap::from([(
                "id-1".to_string(),
                bollard::models::NetworkContainer {
                    name: Some("web-user123".to_string()),
                    ..Default::default()
                },
            )])),
            ..Default::default()
        };

        let info = network_info(network);
        assert_eq!(info.name, "user123");
        assert_eq!(info.labels.get("Hash").map(String::as_str), Some("abc"));
        assert_eq!(info.containers, vec!["web-user123".to_string()]);
    }
}
