// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist pod definitions, users and node settings
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## SQLite Repositories
//!
//! Used by `conductor serve` and the user administration commands:
//! - **SqlitePodCatalog** - Pod definitions, unique on content hash
//! - **SqliteUserRepository** - Peer id to role assignments
//! - **SqliteSettingsRepository** - Node settings singleton
//!
//! ## In-Memory Repositories
//!
//! Lightweight implementations for testing and development:
//! - **InMemoryPodCatalog**
//! - **InMemoryUserRepository**
//! - **InMemorySettingsRepository**

pub mod sqlite;

pub use sqlite::{SqlitePodCatalog, SqliteSettingsRepository, SqliteUserRepository};

use crate::domain::pod::{PodDefinition, PodHash, PodSummary};
use crate::domain::rbac::{PeerId, Role, UserRecord};
use crate::domain::repository::{
    NodeSettings, PodCatalog, RepositoryError, SettingsRepository, UserRepository,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Database("Lock poisoned".to_string())
}

/// Pod definitions kept in insertion order, indexed by hash.
#[derive(Clone, Default)]
pub struct InMemoryPodCatalog {
    pods: Arc<RwLock<Vec<PodDefinition>>>,
}

impl InMemoryPodCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PodCatalog for InMemoryPodCatalog {
    async fn find_by_hash(&self, hash: &PodHash) -> Result<Option<PodDefinition>, RepositoryError> {
        let pods = self.pods.read().map_err(poisoned)?;
        Ok(pods.iter().find(|pod| &pod.hash == hash).cloned())
    }

    async fn insert(&self, pod: &PodDefinition) -> Result<(), RepositoryError> {
        // check and push under one write lock
        let mut pods = self.pods.write().map_err(poisoned)?;
        if pods.iter().any(|existing| existing.hash == pod.hash) {
            return Err(RepositoryError::Duplicate(format!("pod hash {}", pod.hash)));
        }
        pods.push(pod.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PodSummary>, RepositoryError> {
        let pods = self.pods.read().map_err(poisoned)?;
        Ok(pods.iter().map(PodDefinition::summary).collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<(PeerId, Role), UserRecord>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_role(&self, peer: &PeerId) -> Result<Option<Role>, RepositoryError> {
        let users = self.users.read().map_err(poisoned)?;
        Ok(users
            .keys()
            .filter(|(id, _)| id == peer)
            .map(|(_, role)| *role)
            .min_by_key(|role| role.id()))
    }

    async fn add(&self, peer: &PeerId, role: Role) -> Result<(), RepositoryError> {
        if !role.is_assignable() {
            return Err(RepositoryError::Invalid(format!("role '{}' cannot be assigned", role)));
        }
        let mut users = self.users.write().map_err(poisoned)?;
        match users.entry((peer.clone(), role)) {
            Entry::Occupied(_) => Err(RepositoryError::Duplicate(format!("{} is already {}", peer, role))),
            Entry::Vacant(slot) => {
                slot.insert(UserRecord {
                    peer_id: peer.clone(),
                    role,
                    created_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    async fn remove(&self, peer: &PeerId, role: Role) -> Result<bool, RepositoryError> {
        let mut users = self.users.write().map_err(poisoned)?;
        Ok(users.remove(&(peer.clone(), role)).is_some())
    }

    async fn list(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        let users = self.users.read().map_err(poisoned)?;
        let mut records: Vec<UserRecord> = users.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.peer_id.cmp(&b.peer_id)));
        Ok(records)
    }
}

#[derive(Clone, Default)]
pub struct InMemorySettingsRepository {
    settings: Arc<RwLock<Option<NodeSettings>>>,
}

impl InMemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn load(&self) -> Result<Option<NodeSettings>, RepositoryError> {
        Ok(self.settings.read().map_err(poisoned)?.clone())
    }

    async fn initialize(&self, settings: &NodeSettings) -> Result<NodeSettings, RepositoryError> {
        let mut stored = self.settings.write().map_err(poisoned)?;
        Ok(stored.get_or_insert_with(|| settings.clone()).clone())
    }
}
