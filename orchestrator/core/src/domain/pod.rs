// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pod Definitions
//!
//! A pod is an immutable, content-addressed description of one or more
//! container images, exactly one of which is reachable from outside the host.
//!
//! The content hash is the SHA-256 of a canonical string built from the
//! internal port, the sorted image list, the sorted metadata list, the pod
//! name and the external image. Image and metadata lists are sorted before
//! hashing, so two definitions that differ only in list order produce the same
//! hash and the catalog rejects the second one as a duplicate.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Highest container port a pod may expose internally.
pub const MAX_INTERNAL_PORT: i64 = 1023;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PodError {
    #[error("The internal port {0} does not fall within the range 0-{MAX_INTERNAL_PORT}")]
    InternalPortOutOfRange(i64),

    #[error("ExternalImage '{0}' is not contained in the image list")]
    ExternalImageNotListed(String),

    #[error("Image '{0}' is listed more than once")]
    DuplicateImage(String),

    #[error("Image reference must not be empty")]
    EmptyImage,
}

/// Content hash identifying a pod definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodHash(pub String);

impl PodHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PodHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated pod definition as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodDefinition {
    pub name: String,
    /// Image references, sorted.
    pub images: Vec<String>,
    pub external_image: String,
    pub internal_port: u16,
    /// Free-form metadata items, sorted.
    pub metadata: Vec<String>,
    pub hash: PodHash,
}

/// Lightweight `(name, hash)` pair returned by catalog listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSummary {
    pub name: String,
    pub hash: PodHash,
}

impl PodDefinition {
    /// Validate the raw fields and derive the content hash.
    ///
    /// The internal port is taken as a signed value so that negative input
    /// from the wire is reported as out of range rather than as a decode error.
    pub fn new(
        name: impl Into<String>,
        mut images: Vec<String>,
        external_image: impl Into<String>,
        internal_port: i64,
        mut metadata: Vec<String>,
    ) -> Result<Self, PodError> {
        if !(0..=MAX_INTERNAL_PORT).contains(&internal_port) {
            return Err(PodError::InternalPortOutOfRange(internal_port));
        }
        let internal_port = internal_port as u16;

        images.sort();
        metadata.sort();

        if images.iter().any(|image| image.trim().is_empty()) {
            return Err(PodError::EmptyImage);
        }
        if let Some(pair) = images.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(PodError::DuplicateImage(pair[0].clone()));
        }

        let name = name.into();
        let external_image = external_image.into();
        if !images.contains(&external_image) {
            return Err(PodError::ExternalImageNotListed(external_image));
        }

        let hash = content_hash(&name, &images, &external_image, internal_port, &metadata);

        Ok(Self {
            name,
            images,
            external_image,
            internal_port,
            metadata,
            hash,
        })
    }

    pub fn summary(&self) -> PodSummary {
        PodSummary {
            name: self.name.clone(),
            hash: self.hash.clone(),
        }
    }

    pub fn is_external(&self, image: &str) -> bool {
        self.external_image == image
    }
}

/// Hash over the canonical form. Callers must pass already sorted lists.
fn content_hash(
    name: &str,
    images: &[String],
    external_image: &str,
    internal_port: u16,
    metadata: &[String],
) -> PodHash {
    let canonical = format!(
        "{},{},{},{},{}",
        internal_port,
        images.join(", "),
        metadata.join(", "),
        name,
        external_image
    );
    let digest = Sha256::digest(canonical.as_bytes());
    PodHash(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_hash_ignores_list_order() {
        let a = PodDefinition::new(
            "web",
            strings(&["nginx", "redis", "app"]),
            "nginx",
            80,
            strings(&["b", "a"]),
        )
        .unwrap();
        let b = PodDefinition::new(
            "web",
            strings(&["app", "nginx", "redis"]),
            "nginx",
            80,
            strings(&["a", "b"]),
        )
        .unwrap();

        assert_eq!(a.hash, b.hash);
        assert_eq!(a.images, strings(&["app", "nginx", "redis"]));
        assert_eq!(a.metadata, strings(&["a", "b"]));
    }

    #[test]
    fn test_hash_matches_canonical_digest() {
        let pod = PodDefinition::new("hello", strings(&["hello"]), "hello", 80, vec![]).unwrap();
        let expected = hex::encode(Sha256::digest(b"80,hello,,hello,hello"));
        assert_eq!(pod.hash.as_str(), expected);
        assert_eq!(pod.hash.as_str().len(), 64);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = PodDefinition::new("web", strings(&["nginx"]), "nginx", 80, vec![]).unwrap();
        let b = PodDefinition::new("web", strings(&["nginx"]), "nginx", 81, vec![]).unwrap();
        let c = PodDefinition::new("web2", strings(&["nginx"]), "nginx", 80, vec![]).unwrap();
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_external_image_must_be_listed() {
        let err = PodDefinition::new("web", strings(&["nginx"]), "redis", 80, vec![]).unwrap_err();
        assert_eq!(err, PodError::ExternalImageNotListed("redis".to_string()));

        let err = PodDefinition::new("web", vec![], "nginx", 80, vec![]).unwrap_err();
        assert_eq!(err, PodError::ExternalImageNotListed("nginx".to_string()));
    }

    #[test]
    fn test_internal_port_bounds() {
        assert!(PodDefinition::new("p", strings(&["a"]), "a", 0, vec![]).is_ok());
        assert!(PodDefinition::new("p", strings(&["a"]), "a", 1023, vec![]).is_ok());
        assert_eq!(
            PodDefinition::new("p", strings(&["a"]), "a", -1, vec![]).unwrap_err(),
            PodError::InternalPortOutOfRange(-1)
        );
        assert_eq!(
            PodDefinition::new("p", strings(&["a"]), "a", 1024, vec![]).unwrap_err(),
            PodError::InternalPortOutOfRange(1024)
        );
    }

    #[test]
    fn test_duplicate_images_rejected() {
        let err = PodDefinition::new("p", strings(&["a", "b", "a"]), "a", 80, vec![]).unwrap_err();
        assert_eq!(err, PodError::DuplicateImage("a".to_string()));
    }
}
