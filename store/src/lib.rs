//! Storage traits for the shroud node.
//!
//! Consensus and networking code depends only on [`PeerDirectory`] (read-only
//! peer map and chain height) and [`BlockStore`] (append and range reads).
//! [`MemoryChain`] implements both and derives the peer map by applying
//! peer-state commands of every appended block.

pub mod block;
pub mod error;
pub mod memory;
pub mod peer;

pub use block::BlockStore;
pub use error::StoreError;
pub use memory::MemoryChain;
pub use peer::{Peer, PeerDirectory};
