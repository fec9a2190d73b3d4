//! Fundamental types for the shroud node.
//!
//! Keys, signatures, block hashes and millisecond timestamps shared by every
//! other crate in the workspace. Fixed-size byte values serialize as hex in
//! human-readable formats (JSON, TOML) and as raw bytes in bincode.

mod bytes;
pub mod error;
pub mod hash;
pub mod keys;
pub mod time;

pub use error::TypesError;
pub use hash::BlockHash;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use time::{unix_now_ms, Clock, SystemClock, Timestamp};
