//! Peer directory trait.

use serde::{Deserialize, Serialize};
use shroud_ledger::Block;
use shroud_types::PublicKey;

/// An authorized peer as recorded on chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub public_key: PublicKey,
    /// Datagram transport address.
    pub address: String,
    /// API address, used by the peer fetch fallback and the join challenge.
    pub http: String,
    pub stake: u64,
}

/// Read-only view of the authorized peer set and the chain tip.
pub trait PeerDirectory {
    /// All peers, ordered by public key.
    fn peers(&self) -> Vec<Peer>;

    fn peer(&self, public_key: &PublicKey) -> Option<Peer>;

    fn public_key_by_address(&self, address: &str) -> Option<PublicKey>;

    fn height(&self) -> u64;

    fn latest(&self) -> &Block;

    /// At most `count` blocks starting at height `from`.
    fn block_range(&self, from: u64, count: u64) -> Vec<Block>;
}
