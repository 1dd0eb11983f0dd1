// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Authorizer
//!
//! Single decision point between an authenticated caller and a route.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Collaborators:** `RoleTable` (immutable), `UserRepository`
//!
//! A caller that is not registered resolves to [`Role::Unknown`], or to
//! [`Role::Guest`] when the node admits guests. Lookup misses are never
//! errors; only repository failures are.

use crate::domain::rbac::{PeerId, Role, RoleTable, Route};
use crate::domain::repository::{RepositoryError, UserRepository};
use std::sync::Arc;
use tracing::debug;

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow { route: Route, role: Role },
    Deny { role: Role },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

pub struct Authorizer {
    roles: Arc<RoleTable>,
    users: Arc<dyn UserRepository>,
    guest_access: bool,
}

impl Authorizer {
    pub fn new(roles: Arc<RoleTable>, users: Arc<dyn UserRepository>, guest_access: bool) -> Self {
        Self {
            roles,
            users,
            guest_access,
        }
    }

    pub async fn resolve_role(&self, peer: &PeerId) -> Result<Role, RepositoryError> {
        match self.users.find_role(peer).await? {
            Some(role) => Ok(role),
            None if self.guest_access => Ok(Role::Guest),
            None => Ok(Role::Unknown),
        }
    }

    /// Decide whether `peer` may invoke the route named `route_name`.
    ///
    /// Route names absent from the role table are denied.
    pub async fn authorize(&self, peer: &PeerId, route_name: &str) -> Result<Decision, RepositoryError> {
        let role = self.resolve_role(peer).await?;
        let decision = match Route::from_name(route_name) {
            Some(route) if self.roles.permits(route, role) => Decision::Allow { route, role },
            _ => Decision::Deny { role },
        };
        debug!(peer = %peer, route = route_name, role = %role, allowed = decision.is_allowed(), "authorization decision");
        Ok(decision)
    }

    pub fn permitted_routes(&self, role: Role) -> Vec<Route> {
        self.roles.routes_for(role)
    }
}
