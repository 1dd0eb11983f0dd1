// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Route Handlers
//!
//! One handler per route. Each decodes its own typed request from the raw
//! action, calls into the application layer and returns a typed [`Response`].
//!
//! Guests never choose their tenant id or lease: `Start`, `Stop` and `Status`
//! re-derive the caller's role and, for guests, pin the tenant id to the
//! caller's peer id and force the configured guest lease.

use crate::application::authorizer::Authorizer;
use crate::application::orchestration::{OrchestrationError, PodOrchestrator};
use crate::application::pod_registry::{NewPod, PodRegistry, RegistrationError};
use crate::domain::instance::{tenant_of_container, InstanceError, LeaseHours, TenantId};
use crate::domain::pod::PodHash;
use crate::domain::rbac::{PeerId, Role};
use crate::domain::repository::RepositoryError;
use crate::presentation::protocol::{
    decode_payload, xml_tag, Action, AddPodRequest, ListRequest, ProtocolError, Response,
    StartRequest, TenantRequest,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, peer: &PeerId, action: &Action) -> Result<Response, HandlerError>;
}

/// Tenant id a caller acts on: its own peer id for guests, the requested id otherwise.
fn effective_tenant(role: Role, peer: &PeerId, requested: &str) -> Result<TenantId, InstanceError> {
    if role == Role::Guest {
        TenantId::parse(peer.as_str())
    } else {
        TenantId::parse(requested)
    }
}

pub struct AuthHandler {
    authorizer: Arc<Authorizer>,
}

impl AuthHandler {
    pub fn new(authorizer: Arc<Authorizer>) -> Self {
        Self { authorizer }
    }
}

#[async_trait]
impl RouteHandler for AuthHandler {
    async fn handle(&self, peer: &PeerId, _action: &Action) -> Result<Response, HandlerError> {
        let role = self.authorizer.resolve_role(peer).await?;
        let routes = self
            .authorizer
            .permitted_routes(role)
            .into_iter()
            .map(|route| route.to_string())
            .collect();
        Ok(Response::Permissions(routes))
    }
}

pub struct ListHandler {
    registry: Arc<PodRegistry>,
}

impl ListHandler {
    pub fn new(registry: Arc<PodRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl RouteHandler for ListHandler {
    async fn handle(&self, _peer: &PeerId, action: &Action) -> Result<Response, HandlerError> {
        let _request: ListRequest = decode_payload(action)?;
        Ok(Response::Pods(self.registry.list().await?))
    }
}

pub struct AddHandler {
    registry: Arc<PodRegistry>,
}

impl AddHandler {
    pub fn new(registry: Arc<PodRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl RouteHandler for AddHandler {
    async fn handle(&self, _peer: &PeerId, action: &Action) -> Result<Response, HandlerError> {
        let request: AddPodRequest = decode_payload(action)?;
        self.registry
            .register(NewPod {
                name: request.pod_name,
                images: request.images.items,
                external_image: request.external_image,
                internal_port: request.internal_port,
                metadata: request.metadata.items,
            })
            .await?;
        Ok(Response::Added)
    }
}

pub struct StartHandler {
    authorizer: Arc<Authorizer>,
    orchestrator: Arc<PodOrchestrator>,
    advertise_host: String,
    guest_lease: LeaseHours,
}

impl StartHandler {
    pub fn new(
        authorizer: Arc<Authorizer>,
        orchestrator: Arc<PodOrchestrator>,
        advertise_host: impl Into<String>,
        guest_lease: LeaseHours,
    ) -> Self {
        Self {
            authorizer,
            orchestrator,
            advertise_host: advertise_host.into(),
            guest_lease,
        }
    }
}

#[async_trait]
impl RouteHandler for StartHandler {
    async fn handle(&self, peer: &PeerId, action: &Action) -> Result<Response, HandlerError> {
        let request: StartRequest = decode_payload(action)?;
        let role = self.authorizer.resolve_role(peer).await?;

        let tenant = effective_tenant(role, peer, &request.unique_id)?;
        let lease = if role == Role::Guest {
            self.guest_lease
        } else {
            LeaseHours::parse_or(&request.time, self.orchestrator.config().reaper_horizon)?
        };

        let started = self
            .orchestrator
            .start(&PodHash::new(request.hash.trim()), &tenant, lease)
            .await?;

        Ok(Response::Started {
            address: format!("{}:{}", self.advertise_host, started.host_port),
        })
    }
}

pub struct StopHandler {
    authorizer: Arc<Authorizer>,
    orchestrator: Arc<PodOrchestrator>,
}

impl StopHandler {
    pub fn new(authorizer: Arc<Authorizer>, orchestrator: Arc<PodOrchestrator>) -> Self {
        Self {
            authorizer,
            orchestrator,
        }
    }
}

#[async_trait]
impl RouteHandler for StopHandler {
    async fn handle(&self, peer: &PeerId, action: &Action) -> Result<Response, HandlerError> {
        let request: TenantRequest = decode_payload(action)?;
        let role = self.authorizer.resolve_role(peer).await?;
        let tenant = effective_tenant(role, peer, &request.unique_id)?;

        self.orchestrator.stop(&tenant).await?;
        Ok(Response::Stopped)
    }
}

pub struct StatusHandler {
    authorizer: Arc<Authorizer>,
    orchestrator: Arc<PodOrchestrator>,
}

impl StatusHandler {
    pub fn new(authorizer: Arc<Authorizer>, orchestrator: Arc<PodOrchestrator>) -> Self {
        Self {
            authorizer,
            orchestrator,
        }
    }
}

#[async_trait]
impl RouteHandler for StatusHandler {
    async fn handle(&self, peer: &PeerId, action: &Action) -> Result<Response, HandlerError> {
        let request: TenantRequest = decode_payload(action)?;
        let role = self.authorizer.resolve_role(peer).await?;
        let tenant = effective_tenant(role, peer, &request.unique_id)?;

        let status = self.orchestrator.status(&tenant).await?;
        Ok(Response::Status {
            hash: status.hash,
            port: status.port,
        })
    }
}

pub struct RunningHandler {
    orchestrator: Arc<PodOrchestrator>,
}

impl RunningHandler {
    pub fn new(orchestrator: Arc<PodOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl RouteHandler for RunningHandler {
    async fn handle(&self, _peer: &PeerId, _action: &Action) -> Result<Response, HandlerError> {
        let containers = self.orchestrator.list_running().await?;

        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for container in &containers {
            let Some(name) = container.names.first() else {
                continue;
            };
            grouped
                .entry(xml_tag(tenant_of_container(name)))
                .or_default()
                .push(name.to_string());
        }

        Ok(Response::Running(
            grouped
                .into_iter()
                .map(|(tag, names)| (tag, names.join(" ")))
                .collect(),
        ))
    }
}
