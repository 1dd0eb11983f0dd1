// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::pod::{PodDefinition, PodHash, PodSummary};
use crate::domain::rbac::{PeerId, Role, UserRecord};
use crate::domain::repository::{
    NodeSettings, PodCatalog, RepositoryError, SettingsRepository, UserRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

pub struct SqlitePodCatalog {
    pool: SqlitePool,
}

impl SqlitePodCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_pod(row: &SqliteRow) -> Result<PodDefinition, RepositoryError> {
        let port: i64 = row.try_get("InternalPort")?;
        let internal_port = u16::try_from(port)
            .map_err(|_| RepositoryError::Invalid(format!("stored internal port {}", port)))?;
        let images: String = row.try_get("Images")?;
        let metadata: String = row.try_get("Metadata")?;

        Ok(PodDefinition {
            name: row.try_get("PodName")?,
            images: serde_json::from_str(&images)?,
            external_image: row.try_get("ExternalImage")?,
            internal_port,
            metadata: serde_json::from_str(&metadata)?,
            hash: PodHash(row.try_get("Hash")?),
        })
    }
}

#[async_trait]
impl PodCatalog for SqlitePodCatalog {
    async fn find_by_hash(&self, hash: &PodHash) -> Result<Option<PodDefinition>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT PodName, InternalPort, Images, ExternalImage, Hash, Metadata
            FROM pods
            WHERE Hash = ?1
            "#,
        )
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_pod).transpose()
    }

    async fn insert(&self, pod: &PodDefinition) -> Result<(), RepositoryError> {
        // the UNIQUE constraint on Hash makes this atomic
        sqlx::query(
            r#"
            INSERT INTO pods (PodName, InternalPort, Images, ExternalImage, Hash, Metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&pod.name)
        .bind(i64::from(pod.internal_port))
        .bind(serde_json::to_string(&pod.images)?)
        .bind(&pod.external_image)
        .bind(pod.hash.as_str())
        .bind(serde_json::to_string(&pod.metadata)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<PodSummary>, RepositoryError> {
        let rows = sqlx::query("SELECT PodName, Hash FROM pods ORDER BY Id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<PodSummary, RepositoryError> {
                Ok(PodSummary {
                    name: row.try_get("PodName")?,
                    hash: PodHash(row.try_get("Hash")?),
                })
            })
            .collect()
    }
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn role_from_row(id: i64) -> Result<Role, RepositoryError> {
    Role::from_id(id).ok_or_else(|| RepositoryError::Invalid(format!("stored role {}", id)))
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find_role(&self, peer: &PeerId) -> Result<Option<Role>, RepositoryError> {
        // most privileged role wins when a peer holds several
        let role: Option<i64> = sqlx::query_scalar(
            "SELECT Role FROM users WHERE CID = ?1 ORDER BY Role ASC LIMIT 1",
        )
        .bind(peer.as_str())
        .fetch_optional(&self.pool)
        .await?;

        role.map(role_from_row).transpose()
    }

    async fn add(&self, peer: &PeerId, role: Role) -> Result<(), RepositoryError> {
        if !role.is_assignable() {
            return Err(RepositoryError::Invalid(format!("role '{}' cannot be assigned", role)));
        }

        sqlx::query("INSERT INTO users (Role, CID, CreatedAt) VALUES (?1, ?2, ?3)")
            .bind(role.id())
            .bind(peer.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn remove(&self, peer: &PeerId, role: Role) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE CID = ?1 AND Role = ?2")
            .bind(peer.as_str())
            .bind(role.id())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        let rows = sqlx::query("SELECT Role, CID, CreatedAt FROM users ORDER BY CreatedAt, CID")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<UserRecord, RepositoryError> {
                let created_at: DateTime<Utc> = row.try_get("CreatedAt")?;
                Ok(UserRecord {
                    peer_id: PeerId(row.try_get("CID")?),
                    role: role_from_row(row.try_get("Role")?)?,
                    created_at,
                })
            })
            .collect()
    }
}

pub struct SqliteSettingsRepository {
    pool: SqlitePool,
}

impl SqliteSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for SqliteSettingsRepository {
    async fn load(&self) -> Result<Option<NodeSettings>, RepositoryError> {
        let row = sqlx::query("SELECT Port, DHT, PrivKey FROM settings WHERE Id = 1")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let port: i64 = row.try_get("Port")?;
        let listen_port = u16::try_from(port)
            .map_err(|_| RepositoryError::Invalid(format!("stored port {}", port)))?;

        Ok(Some(NodeSettings {
            listen_port,
            discovery_id: row.try_get("DHT")?,
            private_key: row.try_get("PrivKey")?,
        }))
    }

    async fn initialize(&self, settings: &NodeSettings) -> Result<NodeSettings, RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO settings (Id, Port, DHT, PrivKey, Version, CreatedAt)
            VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (Id) DO NOTHING
            "#,
        )
        .bind(i64::from(settings.listen_port))
        .bind(&settings.discovery_id)
        .bind(&settings.private_key)
        .bind(env!("CARGO_PKG_VERSION"))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.load()
            .await?
            .ok_or_else(|| RepositoryError::NotFound("settings record".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::Database;

    fn pod(name: &str, images: &[&str], metadata: &[&str]) -> PodDefinition {
        PodDefinition::new(
            name,
            images.iter().map(|s| s.to_string()).collect(),
            "nginx",
            80,
            metadata.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_pod_catalog_roundtrip_and_duplicate() {
        let db = Database::in_memory().await.unwrap();
        let catalog = SqlitePodCatalog::new(db.get_pool().clone());

        let web = pod("web", &["nginx", "redis"], &["tier=front"]);
        catalog.insert(&web).await.unwrap();

        let found = catalog.find_by_hash(&web.hash).await.unwrap().unwrap();
        assert_eq!(found, web);
        assert!(catalog.find_by_hash(&PodHash::new("missing")).await.unwrap().is_none());

        let reordered = pod("web", &["redis", "nginx"], &["tier=front"]);
        assert!(matches!(
            catalog.insert(&reordered).await,
            Err(RepositoryError::Duplicate(_))
        ));

        let listed = catalog.list().await.unwrap();
        assert_eq!(listed, vec![web.summary()]);
    }

    #[tokio::test]
    async fn test_users_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("node.db")).await.unwrap();
        let users = SqliteUserRepository::new(db.get_pool().clone());
        let peer = PeerId::new("12D3KooWpeer");

        users.add(&peer, Role::User).await.unwrap();
        assert!(matches!(users.add(&peer, Role::User).await, Err(RepositoryError::Duplicate(_))));
        users.add(&peer, Role::Admin).await.unwrap();
        assert_eq!(users.find_role(&peer).await.unwrap(), Some(Role::Admin));

        let listed = users.list().await.unwrap();
        assert_eq!(listed.len(), 2);

        assert!(users.remove(&peer, Role::Admin).await.unwrap());
        assert_eq!(users.find_role(&peer).await.unwrap(), Some(Role::User));
        assert_eq!(users.find_role(&PeerId::new("other")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_settings_singleton() {
        let db = Database::in_memory().await.unwrap();
        let settings = SqliteSettingsRepository::new(db.get_pool().clone());
        assert!(settings.load().await.unwrap().is_none());

        let initial = NodeSettings {
            listen_port: 41537,
            discovery_id: "abcdefghijklmno".to_string(),
            private_key: vec![7; 32],
        };
        assert_eq!(settings.initialize(&initial).await.unwrap(), initial);

        let other = NodeSettings {
            listen_port: 5000,
            ..initial.clone()
        };
        assert_eq!(settings.initialize(&other).await.unwrap(), initial);
        assert_eq!(settings.load().await.unwrap(), Some(initial));
    }
}
