// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Roles and the Role Table
//!
//! Callers are identified by their peer id and mapped to an integer role.
//! The [`RoleTable`] maps each route to the set of roles allowed to invoke it.
//! It is built once at startup and shared read-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Privilege level of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Unknown,
    Admin,
    User,
    Guest,
}

impl Role {
    pub fn id(self) -> i64 {
        match self {
            Role::Unknown => 0,
            Role::Admin => 1,
            Role::User => 2,
            Role::Guest => 3,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(Role::Unknown),
            1 => Some(Role::Admin),
            2 => Some(Role::User),
            3 => Some(Role::Guest),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Role::Unknown => "unknown",
            Role::Admin => "admin",
            Role::User => "user",
            Role::Guest => "guest",
        }
    }

    /// Only admins and users are ever written to the user repository.
    pub fn is_assignable(self) -> bool {
        matches!(self, Role::Admin | Role::User)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Operations exposed over the wire; the variant name is the envelope tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Route {
    Auth,
    List,
    Start,
    Stop,
    Status,
    Running,
    Add,
}

impl Route {
    pub const ALL: [Route; 7] = [
        Route::Auth,
        Route::List,
        Route::Start,
        Route::Stop,
        Route::Status,
        Route::Running,
        Route::Add,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Route::Auth => "Auth",
            Route::List => "List",
            Route::Start => "Start",
            Route::Stop => "Stop",
            Route::Status => "Status",
            Route::Running => "Running",
            Route::Add => "Add",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|route| route.as_str() == name)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated identity of the remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub peer_id: PeerId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Immutable route → allowed-roles mapping.
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    routes: BTreeMap<Route, BTreeSet<Role>>,
}

impl RoleTable {
    pub fn builder() -> RoleTableBuilder {
        RoleTableBuilder::default()
    }

    /// The node's standard permissions.
    ///
    /// Guests may call `Start`, `Stop` and `Status`; the handlers pin their
    /// tenant id to the caller identity and force the lease.
    pub fn standard() -> Self {
        use Role::*;
        Self::builder()
            .allow(Route::Auth, [Unknown, Admin, User, Guest])
            .allow(Route::List, [Admin, User])
            .allow(Route::Start, [Admin, User, Guest])
            .allow(Route::Stop, [Admin, User, Guest])
            .allow(Route::Status, [Admin, User, Guest])
            .allow(Route::Running, [Admin])
            .allow(Route::Add, [Admin])
            .build()
    }

    /// Whether `role` may invoke `route`. Routes missing from the table are
    /// never allowed.
    pub fn permits(&self, route: Route, role: Role) -> bool {
        self.routes
            .get(&route)
            .is_some_and(|roles| roles.contains(&role))
    }

    /// Every route `role` may invoke, in table order.
    pub fn routes_for(&self, role: Role) -> Vec<Route> {
        self.routes
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(route, _)| *route)
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct RoleTableBuilder {
    routes: BTreeMap<Route, BTreeSet<Role>>,
}

impl RoleTableBuilder {
    pub fn allow(mut self, route: Route, roles: impl IntoIterator<Item = Role>) -> Self {
        self.routes.entry(route).or_default().extend(roles);
        self
    }

    pub fn build(self) -> RoleTable {
        RoleTable { routes: self.routes }
    }
}
