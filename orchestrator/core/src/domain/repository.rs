// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts, defined in the domain layer and implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Holds | Implementations |
//! |-------|-------|----------------|
//! | `PodCatalog` | pod definitions | `InMemoryPodCatalog`, `SqlitePodCatalog` |
//! | `UserRepository` | user roles | `InMemoryUserRepository`, `SqliteUserRepository` |
//! | `SettingsRepository` | node settings singleton | `InMemorySettingsRepository`, `SqliteSettingsRepository` |
//!
//! The catalog is the sole writer of pod definitions. Inserts must be atomic:
//! a second definition with an existing hash fails with
//! [`RepositoryError::Duplicate`] rather than racing a read-then-insert.

use async_trait::async_trait;
use crate::domain::pod::{PodDefinition, PodHash, PodSummary};
use crate::domain::rbac::{PeerId, Role, UserRecord};

/// Content-addressed store of pod definitions.
#[async_trait]
pub trait PodCatalog: Send + Sync {
    /// Find a definition by its content hash
    async fn find_by_hash(&self, hash: &PodHash) -> Result<Option<PodDefinition>, RepositoryError>;

    /// Insert a new definition; fails with `Duplicate` if the hash exists
    async fn insert(&self, pod: &PodDefinition) -> Result<(), RepositoryError>;

    /// List `(name, hash)` of every definition
    async fn list(&self) -> Result<Vec<PodSummary>, RepositoryError>;
}

/// Administratively assigned roles keyed by peer id.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Role of `peer`, or `None` if the peer is not registered
    async fn find_role(&self, peer: &PeerId) -> Result<Option<Role>, RepositoryError>;

    /// Grant `role` to `peer`
    async fn add(&self, peer: &PeerId, role: Role) -> Result<(), RepositoryError>;

    /// Revoke `role` from `peer`; returns whether a record was removed
    async fn remove(&self, peer: &PeerId, role: Role) -> Result<bool, RepositoryError>;

    /// List all users
    async fn list(&self) -> Result<Vec<UserRecord>, RepositoryError>;
}

/// Singleton node settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    pub listen_port: u16,
    /// Identifier announced to peer discovery.
    pub discovery_id: String,
    /// Encoded node identity key.
    pub private_key: Vec<u8>,
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Load the settings record if one was ever written
    async fn load(&self) -> Result<Option<NodeSettings>, RepositoryError>;

    /// Store `settings` unless a record already exists; returns the stored record
    async fn initialize(&self, settings: &NodeSettings) -> Result<NodeSettings, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Invalid entry: {0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                RepositoryError::Duplicate(db_err.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
