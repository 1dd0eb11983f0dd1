// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Dispatcher
//!
//! Per-stream pipeline: read one bounded request, decode the envelope,
//! authorize the caller, run the route's handler, write the encoded response
//! and close the stream.
//!
//! Every failure is answered on the stream. Nothing a request does can take
//! the node down or affect another stream.

use crate::application::authorizer::{Authorizer, Decision};
use crate::application::orchestration::PodOrchestrator;
use crate::application::pod_registry::PodRegistry;
use crate::domain::instance::LeaseHours;
use crate::domain::rbac::{PeerId, Route};
use crate::presentation::handlers::{
    AddHandler, AuthHandler, ListHandler, RouteHandler, RunningHandler, StartHandler,
    StatusHandler, StopHandler,
};
use crate::presentation::protocol::{decode_envelope, ProtocolError, Response};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub max_bytes: usize,
    pub read_timeout: Duration,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024,
            read_timeout: Duration::from_secs(30),
        }
    }
}

pub struct Dispatcher {
    authorizer: Arc<Authorizer>,
    routes: HashMap<Route, Arc<dyn RouteHandler>>,
    limits: RequestLimits,
}

impl Dispatcher {
    pub fn new(authorizer: Arc<Authorizer>, limits: RequestLimits) -> Self {
        Self {
            authorizer,
            routes: HashMap::new(),
            limits,
        }
    }

    pub fn register(&mut self, route: Route, handler: Arc<dyn RouteHandler>) {
        self.routes.insert(route, handler);
    }

    /// Dispatcher with a handler for every route.
    pub fn with_standard_routes(
        authorizer: Arc<Authorizer>,
        registry: Arc<PodRegistry>,
        orchestrator: Arc<PodOrchestrator>,
        advertise_host: impl Into<String>,
        guest_lease: LeaseHours,
        limits: RequestLimits,
    ) -> Self {
        let mut dispatcher = Self::new(Arc::clone(&authorizer), limits);
        dispatcher.register(Route::Auth, Arc::new(AuthHandler::new(Arc::clone(&authorizer))));
        dispatcher.register(Route::List, Arc::new(ListHandler::new(Arc::clone(&registry))));
        dispatcher.register(Route::Add, Arc::new(AddHandler::new(registry)));
        dispatcher.register(
            Route::Start,
            Arc::new(StartHandler::new(
                Arc::clone(&authorizer),
                Arc::clone(&orchestrator),
                advertise_host,
                guest_lease,
            )),
        );
        dispatcher.register(
            Route::Stop,
            Arc::new(StopHandler::new(Arc::clone(&authorizer), Arc::clone(&orchestrator))),
        );
        dispatcher.register(
            Route::Status,
            Arc::new(StatusHandler::new(Arc::clone(&authorizer), Arc::clone(&orchestrator))),
        );
        dispatcher.register(Route::Running, Arc::new(RunningHandler::new(orchestrator)));
        dispatcher
    }

    /// Serve one request on `stream` and close it.
    pub async fn handle_stream<S>(&self, peer: &PeerId, mut stream: S) -> std::io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let response = match self.read_request(&mut stream).await {
            Ok(request) => self.dispatch(peer, &request).await,
            Err(e) => {
                warn!(peer = %peer, "Rejected request: {}", e);
                Response::Error
            }
        };

        stream.write_all(response.encode().as_bytes()).await?;
        stream.shutdown().await
    }

    async fn read_request<S>(&self, stream: &mut S) -> Result<Vec<u8>, ProtocolError>
    where
        S: AsyncRead + Unpin,
    {
        let max = self.limits.max_bytes;
        let mut request = Vec::new();
        let mut limited = stream.take(max as u64 + 1);

        match tokio::time::timeout(self.limits.read_timeout, limited.read_to_end(&mut request)).await {
            Ok(Ok(_)) if request.len() > max => Err(ProtocolError::TooLarge(max)),
            Ok(Ok(_)) => Ok(request),
            Ok(Err(e)) => Err(ProtocolError::Malformed(e.to_string())),
            Err(_) => Err(ProtocolError::Malformed("timed out reading request".to_string())),
        }
    }

    /// Run the decode, authorize and handle steps for one request.
    pub async fn dispatch(&self, peer: &PeerId, request: &[u8]) -> Response {
        let action = match decode_envelope(request) {
            Ok(action) => action,
            Err(e) => {
                warn!(peer = %peer, "Undecodable request: {}", e);
                return Response::Error;
            }
        };

        let span = info_span!("request", peer = %peer, route = %action.route);
        async {
            let route = match self.authorizer.authorize(peer, &action.route).await {
                Ok(Decision::Allow { route, .. }) => route,
                Ok(Decision::Deny { role }) => {
                    warn!(role = %role, "Authorization denied");
                    return Response::Denied;
                }
                Err(e) => {
                    error!("Role lookup failed: {}", e);
                    return Response::Error;
                }
            };

            let Some(handler) = self.routes.get(&route) else {
                warn!("No handler registered");
                return Response::Error;
            };

            match handler.handle(peer, &action).await {
                Ok(response) => {
                    debug!(status = response.status(), "Request handled");
                    response
                }
                Err(e) => {
                    warn!("Request failed: {}", e);
                    Response::Error
                }
            }
        }
        .instrument(span)
        .await
    }
}
