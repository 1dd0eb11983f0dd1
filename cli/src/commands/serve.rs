// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Node process
//!
//! Opens the catalog, loads the node identity, connects to Docker and serves
//! requests until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use conductor_core::application::{
    Authorizer, OrchestratorConfig, PodOrchestrator, PodRegistry, PortAllocator,
};
use conductor_core::domain::instance::LeaseHours;
use conductor_core::domain::rbac::RoleTable;
use conductor_core::domain::repository::{PodCatalog, UserRepository};
use conductor_core::domain::runtime::ContainerRuntime;
use conductor_core::infrastructure::identity::load_or_init_node;
use conductor_core::infrastructure::public_ip::resolve_advertise_host;
use conductor_core::infrastructure::repositories::{
    SqlitePodCatalog, SqliteSettingsRepository, SqliteUserRepository,
};
use conductor_core::infrastructure::runtime::DockerRuntime;
use conductor_core::presentation::dispatcher::{Dispatcher, RequestLimits};
use conductor_core::presentation::transport::Server;

use super::{load_config, open_database};

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let spec = &config.spec;
    info!("Configuration loaded: node={}", config.metadata.name);

    let db = open_database(&config).await?;
    let pool = db.get_pool().clone();

    let settings = SqliteSettingsRepository::new(pool.clone());
    let (identity, stored) = load_or_init_node(&settings)
        .await
        .context("Failed to load node identity")?;
    info!(
        "Node identity {} (discovery id {})",
        identity.peer_id(),
        stored.discovery_id
    );

    let runtime = DockerRuntime::new(spec.runtime.docker_socket.clone(), spec.runtime.call_timeout())
        .context("Failed to connect to Docker")?;
    if let Err(e) = runtime.healthcheck().await {
        warn!("Docker is not answering yet: {}", e);
    }
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(runtime);

    let catalog: Arc<dyn PodCatalog> = Arc::new(SqlitePodCatalog::new(pool.clone()));
    let users: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(pool));

    let authorizer = Arc::new(Authorizer::new(
        Arc::new(RoleTable::standard()),
        users,
        spec.access.guest_access,
    ));
    if spec.access.guest_access {
        info!("Guest access enabled: unknown peers may start pods for themselves");
    }

    let registry = Arc::new(PodRegistry::new(Arc::clone(&catalog), Arc::clone(&runtime)));
    let ports = PortAllocator::new(spec.pods.port_range_start, spec.pods.port_range_end);
    let orchestrator = Arc::new(PodOrchestrator::new(
        runtime,
        catalog,
        ports,
        OrchestratorConfig {
            network_driver: spec.runtime.network_driver.clone(),
            port_conflict_retries: spec.pods.port_conflict_retries,
            reaper_horizon: LeaseHours(spec.pods.reaper_horizon_hours),
        },
    ));

    let sweeper = spec
        .pods
        .sweep_interval_minutes
        .map(|minutes| orchestrator.spawn_periodic_sweep(Duration::from_secs(minutes * 60)));

    let advertise_host = resolve_advertise_host(&spec.network).await;
    info!("Advertising pod addresses on {}", advertise_host);

    let dispatcher = Arc::new(Dispatcher::with_standard_routes(
        authorizer,
        registry,
        orchestrator,
        advertise_host,
        LeaseHours(spec.pods.guest_lease_hours),
        RequestLimits {
            max_bytes: spec.network.max_request_bytes,
            read_timeout: spec.network.request_timeout(),
        },
    ));

    let port = spec.network.listen_port.unwrap_or(stored.listen_port);
    let addr = format!("{}:{}", spec.network.bind_address, port);
    let server = Server::bind(
        addr.as_str(),
        Arc::new(identity),
        dispatcher,
        spec.network.handshake_timeout(),
    )
    .await
    .with_context(|| format!("Failed to bind to {}", addr))?;

    server
        .serve(shutdown_signal())
        .await
        .context("Listener failed")?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    info!("Node shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
