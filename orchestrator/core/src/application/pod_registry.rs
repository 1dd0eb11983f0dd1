// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Register Pod Use Case
//!
//! Validates a submitted pod definition and stores it in the catalog.
//!
//! # Flow
//!
//! 1. Build the `PodDefinition` (port range, external image, duplicate images)
//! 2. Ask the container runtime whether every image exists locally
//! 3. Insert into the `PodCatalog`; an existing hash fails with `Duplicate`
//!
//! Every check runs before the catalog is touched.

use crate::domain::pod::{PodDefinition, PodError, PodSummary};
use crate::domain::repository::{PodCatalog, RepositoryError};
use crate::domain::runtime::{ContainerRuntime, RuntimeError};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Unvalidated pod definition as submitted by a caller.
#[derive(Debug, Clone, Default)]
pub struct NewPod {
    pub name: String,
    pub images: Vec<String>,
    pub external_image: String,
    pub internal_port: i64,
    pub metadata: Vec<String>,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Invalid(#[from] PodError),

    #[error("Image '{0}' does not exist on this node")]
    MissingImage(String),

    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] RepositoryError),
}

pub struct PodRegistry {
    catalog: Arc<dyn PodCatalog>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl PodRegistry {
    pub fn new(catalog: Arc<dyn PodCatalog>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { catalog, runtime }
    }

    pub async fn register(&self, pod: NewPod) -> Result<PodDefinition, RegistrationError> {
        let definition = PodDefinition::new(
            pod.name,
            pod.images,
            pod.external_image,
            pod.internal_port,
            pod.metadata,
        )?;

        for image in &definition.images {
            if !self.runtime.image_exists(image).await? {
                return Err(RegistrationError::MissingImage(image.clone()));
            }
        }

        self.catalog.insert(&definition).await?;
        info!(name = %definition.name, hash = %definition.hash, "Registered pod");
        Ok(definition)
    }

    pub async fn list(&self) -> Result<Vec<PodSummary>, RepositoryError> {
        self.catalog.list().await
    }
}
