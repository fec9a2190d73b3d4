//! Cryptographic primitives for the shroud node.
//!
//! - **Ed25519** for signing envelopes, votes, commits and transactions
//! - **Blake2b-256** for block hashes and message idents
//! - A [`Wallet`] capability that owns the node key and signs on request

pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;
pub mod token;
pub mod wallet;

pub use error::CryptoError;
pub use hash::{blake2b_256, blake2b_256_multi};
pub use keys::{generate_keypair, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
pub use token::{is_token, random_token};
pub use wallet::{KeyWallet, Wallet};
