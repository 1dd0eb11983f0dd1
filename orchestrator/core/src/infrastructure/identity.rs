// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Node and client identity keys.
//!
//! An identity is an Ed25519 key pair; its peer id is the lowercase hex of
//! the public key. The node keeps its key in the settings record, clients
//! keep theirs in a key file holding the hex-encoded secret seed.
//!
//! A missing key is generated once. A key that exists but cannot be decoded
//! is reported as [`IdentityError::Corrupt`] and never replaced silently.

use crate::domain::rbac::PeerId;
use crate::domain::repository::{NodeSettings, RepositoryError, SettingsRepository};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Port written to a fresh settings record.
pub const DEFAULT_LISTEN_PORT: u16 = 41537;

const DISCOVERY_ID_LEN: usize = 15;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity key material is corrupt: {0}")]
    Corrupt(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Key file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings repository error: {0}")]
    Repository(#[from] RepositoryError),
}

pub struct NodeIdentity {
    signing_key: SigningKey,
}

impl NodeIdentity {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand_core::OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let seed: [u8; 32] = bytes.try_into().map_err(|_| {
            IdentityError::Corrupt(format!("expected 32 key bytes, found {}", bytes.len()))
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId(self.public_key_hex())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Load the key file at `path`, creating it with a fresh key if absent.
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let path = path.as_ref();
        if !path.exists() {
            let identity = Self::generate();
            identity.save(path)?;
            info!("Generated new identity {} at {:?}", identity.peer_id(), path);
            return Ok(identity);
        }

        let content = std::fs::read_to_string(path)?;
        let bytes = hex::decode(content.trim())
            .map_err(|e| IdentityError::Corrupt(format!("{:?}: {}", path, e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IdentityError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("{}\n", hex::encode(self.to_bytes())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

/// Check `signature_hex` over `message` against `public_key_hex` and return
/// the peer id it proves.
pub fn verify_peer(
    public_key_hex: &str,
    message: &[u8],
    signature_hex: &str,
) -> Result<PeerId, IdentityError> {
    let key_bytes: [u8; 32] = hex::decode(public_key_hex)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| IdentityError::InvalidPublicKey("expected 32 hex-encoded bytes".to_string()))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))?;

    let sig_bytes: [u8; 64] = hex::decode(signature_hex)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(IdentityError::BadSignature)?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| IdentityError::BadSignature)?;

    Ok(PeerId(hex::encode(key_bytes)))
}

/// Random alphanumeric identifier announced to peer discovery.
pub fn generate_discovery_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(DISCOVERY_ID_LEN)
        .map(char::from)
        .collect()
}

/// Load the node identity from the settings record, initialising the record
/// with a fresh identity on first start.
pub async fn load_or_init_node(
    settings: &dyn SettingsRepository,
) -> Result<(NodeIdentity, NodeSettings), IdentityError> {
    let stored = match settings.load().await? {
        Some(stored) => stored,
        None => {
            let identity = NodeIdentity::generate();
            let fresh = NodeSettings {
                listen_port: DEFAULT_LISTEN_PORT,
                discovery_id: generate_discovery_id(),
                private_key: identity.to_bytes().to_vec(),
            };
            let stored = settings.initialize(&fresh).await?;
            info!("Initialised node settings with identity {}", identity.peer_id());
            stored
        }
    };

    let identity = NodeIdentity::from_bytes(&stored.private_key)?;
    Ok((identity, stored))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemorySettingsRepository;

    #[test]
    fn test_sign_and_verify() {
        let identity = NodeIdentity::generate();
        let signature = identity.sign(b"hello");
        let sig_hex = hex::encode(signature.to_bytes());

        let peer = verify_peer(&identity.public_key_hex(), b"hello", &sig_hex).unwrap();
        assert_eq!(peer, identity.peer_id());

        assert!(matches!(
            verify_peer(&identity.public_key_hex(), b"other", &sig_hex),
            Err(IdentityError::BadSignature)
        ));
        assert!(matches!(
            verify_peer("zz", b"hello", &sig_hex),
            Err(IdentityError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_key_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("client.key");

        let created = NodeIdentity::load_or_generate(&path).unwrap();
        let loaded = NodeIdentity::load_or_generate(&path).unwrap();
        assert_eq!(created.peer_id(), loaded.peer_id());

        std::fs::write(&path, "not hex").unwrap();
        assert!(matches!(
            NodeIdentity::load_or_generate(&path),
            Err(IdentityError::Corrupt(_))
        ));
    }

    #[test]
    fn test_discovery_id_shape() {
        let id = generate_discovery_id();
        assert_eq!(id.len(), 15);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_node_identity_is_stable() {
        let repo = InMemorySettingsRepository::new();
        let (first, settings) = load_or_init_node(&repo).await.unwrap();
        assert_eq!(settings.listen_port, DEFAULT_LISTEN_PORT);

        let (second, _) = load_or_init_node(&repo).await.unwrap();
        assert_eq!(first.peer_id(), second.peer_id());
    }

    #[tokio::test]
    async fn test_corrupt_node_key_is_fatal() {
        let repo = InMemorySettingsRepository::new();
        repo.initialize(&NodeSettings {
            listen_port: DEFAULT_LISTEN_PORT,
            discovery_id: generate_discovery_id(),
            private_key: vec![1, 2, 3],
        })
        .await
        .unwrap();

        assert!(matches!(
            load_or_init_node(&repo).await,
            Err(IdentityError::Corrupt(_))
        ));
    }
}
