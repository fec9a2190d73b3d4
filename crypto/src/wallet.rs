//! The node wallet: holds the identity key and signs on request.
//!
//! Consensus and messaging code only ever see the [`Wallet`] trait so tests
//! can run many nodes in-process with seeded keys.

use std::path::Path;

use shroud_types::{KeyPair, PublicKey, Signature};

use crate::error::CryptoError;
use crate::keys::{generate_keypair, keypair_from_seed};
use crate::sign::sign_message;

/// Signing capability of a node.
pub trait Wallet: Send {
    fn public_key(&self) -> PublicKey;
    fn sign(&self, message: &[u8]) -> Signature;
}

/// A wallet backed by an in-memory Ed25519 key pair.
pub struct KeyWallet {
    keypair: KeyPair,
}

impl KeyWallet {
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(keypair_from_seed(seed))
    }

    pub fn generate() -> Self {
        Self::new(generate_keypair())
    }

    /// Load the key seed stored hex-encoded at `path`, or create a fresh key
    /// and persist it there.
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let bytes = hex::decode(raw.trim()).map_err(|e| CryptoError::MalformedKeyFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            let seed: [u8; 32] =
                bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| CryptoError::MalformedKeyFile {
                        path: path.display().to_string(),
                        reason: format!("expected 32 bytes, got {}", bytes.len()),
                    })?;
            return Ok(Self::from_seed(&seed));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let wallet = Self::generate();
        std::fs::write(path, hex::encode(wallet.keypair.private.0))?;
        tracing::info!(path = %path.display(), public_key = %wallet.public_key(), "created node key");
        Ok(wallet)
    }
}

impl Wallet for KeyWallet {
    fn public_key(&self) -> PublicKey {
        self.keypair.public
    }

    fn sign(&self, message: &[u8]) -> Signature {
        sign_message(message, &self.keypair.private)
    }
}
