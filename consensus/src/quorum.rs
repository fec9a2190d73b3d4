//! Stake-weighted quorum.
//!
//! Weight is the sum of stake over *distinct* origins, so repeated
//! attestations from one peer never count twice. Only peers with non-zero
//! stake contribute to the total.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use shroud_store::{Peer, PeerDirectory};
use shroud_types::{BlockHash, PublicKey};

pub const DEFAULT_QUORUM_BPS: u32 = 6_700;
pub const MIN_QUORUM_BPS: u32 = 5_001;
pub const MAX_QUORUM_BPS: u32 = 10_000;

/// Stake per peer at a point in the chain.
#[derive(Clone, Debug, Default)]
pub struct StakeTable {
    stakes: HashMap<PublicKey, u64>,
    total: u64,
}

impl StakeTable {
    pub fn from_peers(peers: &[Peer]) -> Self {
        let mut table = Self::default();
        for peer in peers.iter().filter(|p| p.stake > 0) {
            table.stakes.insert(peer.public_key, peer.stake);
            table.total = table.total.saturating_add(peer.stake);
        }
        table
    }

    pub fn from_directory(directory: &dyn PeerDirectory) -> Self {
        Self::from_peers(&directory.peers())
    }

    pub fn stake_of(&self, pk: &PublicKey) -> u64 {
        self.stakes.get(pk).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.stakes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stakes.is_empty()
    }

    /// Combined stake of the distinct keys in `origins`.
    pub fn weight_of<'a>(&self, origins: impl IntoIterator<Item = &'a PublicKey>) -> u64 {
        let distinct: BTreeSet<&PublicKey> = origins.into_iter().collect();
        distinct
            .into_iter()
            .map(|pk| self.stake_of(pk))
            .fold(0u64, u64::saturating_add)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuorumPolicy {
    bps: u32,
}

impl QuorumPolicy {
    /// `bps` is clamped to a strict majority at least.
    pub fn new(bps: u32) -> Self {
        Self {
            bps: bps.clamp(MIN_QUORUM_BPS, MAX_QUORUM_BPS),
        }
    }

    pub fn bps(&self) -> u32 {
        self.bps
    }

    /// `ceil(total × bps / 10000)`.
    pub fn threshold(&self, total: u64) -> u64 {
        let num = total as u128 * self.bps as u128;
        num.div_ceil(MAX_QUORUM_BPS as u128) as u64
    }

    pub fn status(&self, weight: u64, total: u64) -> QuorumStatus {
        let need = self.threshold(total);
        if total > 0 && weight >= need {
            QuorumStatus::Reached { weight }
        } else {
            QuorumStatus::Pending { weight, need }
        }
    }
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_QUORUM_BPS)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuorumStatus {
    Pending { weight: u64, need: u64 },
    Reached { weight: u64 },
}

impl QuorumStatus {
    pub fn is_reached(&self) -> bool {
        matches!(self, Self::Reached { .. })
    }
}

/// One row of a vote or commit pool view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttestationSummary {
    pub hash: BlockHash,
    pub height: u64,
    pub origins: Vec<PublicKey>,
    pub weight: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(i: u8, stake: u64) -> Peer {
        Peer {
            public_key: PublicKey([i; 32]),
            address: format!("p{i}"),
            http: String::new(),
            stake,
        }
    }

    #[test]
    fn threshold_rounds_up() {
        let policy = QuorumPolicy::default();
        assert_eq!(policy.threshold(7_000), 4_690);
        assert_eq!(policy.threshold(3), 3);
        assert_eq!(policy.threshold(100), 67);
        assert_eq!(policy.threshold(0), 0);
    }

    #[test]
    fn bps_clamped_to_majority() {
        assert_eq!(QuorumPolicy::new(0).bps(), MIN_QUORUM_BPS);
        assert_eq!(QuorumPolicy::new(20_000).bps(), MAX_QUORUM_BPS);
    }

    #[test]
    fn unstaked_peers_excluded() {
        let table = StakeTable::from_peers(&[peer(1, 10), peer(2, 0), peer(3, 5)]);
        assert_eq!(table.total(), 15);
        assert_eq!(table.len(), 2);
        assert_eq!(table.stake_of(&PublicKey([2; 32])), 0);
    }

    #[test]
    fn repeated_origins_count_once() {
        let table = StakeTable::from_peers(&[peer(1, 10), peer(2, 10)]);
        let a = PublicKey([1; 32]);
        assert_eq!(table.weight_of([&a, &a, &a]), 10);
    }

    #[test]
    fn empty_table_never_reaches_quorum() {
        let policy = QuorumPolicy::default();
        assert!(!policy.status(0, 0).is_reached());
        assert!(policy.status(67, 100).is_reached());
        assert_eq!(
            policy.status(66, 100),
            QuorumStatus::Pending { weight: 66, need: 67 }
        );
    }
}
