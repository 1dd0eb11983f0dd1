// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SQLite Connection Pool
//!
//! Wraps `sqlx::sqlite::SqlitePool` in a thin `Database` newtype that is
//! injected into the SQLite repository implementations. The schema is
//! created on open.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS pods (
        Id INTEGER PRIMARY KEY AUTOINCREMENT,
        PodName TEXT NOT NULL,
        InternalPort INTEGER NOT NULL,
        Images TEXT NOT NULL,
        ExternalImage TEXT NOT NULL,
        Hash TEXT NOT NULL UNIQUE,
        Metadata TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        Id INTEGER PRIMARY KEY AUTOINCREMENT,
        Role INTEGER NOT NULL,
        CID TEXT NOT NULL,
        CreatedAt TEXT NOT NULL,
        UNIQUE (CID, Role)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        Id INTEGER PRIMARY KEY CHECK (Id = 1),
        Port INTEGER NOT NULL,
        DHT TEXT NOT NULL,
        PrivKey BLOB NOT NULL,
        Version TEXT NOT NULL,
        CreatedAt TEXT NOT NULL
    )
    "#,
];

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Private in-memory database; a single connection keeps it alive.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to create schema")?;
        }
        Ok(())
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }
}
