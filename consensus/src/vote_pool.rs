//! Votes per block hash.

use std::collections::{BTreeMap, HashMap};

use shroud_ledger::{Block, VoteSignature};
use shroud_messages::Vote;
use shroud_types::{BlockHash, PublicKey};

use crate::quorum::{AttestationSummary, QuorumPolicy, QuorumStatus, StakeTable};

#[derive(Debug)]
struct VoteEntry {
    block: Block,
    votes: BTreeMap<PublicKey, VoteSignature>,
}

#[derive(Debug, Default)]
pub struct VotePool {
    entries: HashMap<BlockHash, VoteEntry>,
}

impl VotePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validated vote and report the block's quorum status. The first
    /// vote from an origin wins; repeats change nothing.
    pub fn add(&mut self, vote: &Vote, stakes: &StakeTable, policy: &QuorumPolicy) -> QuorumStatus {
        let entry = self
            .entries
            .entry(vote.block.hash)
            .or_insert_with(|| VoteEntry {
                block: Block {
                    votes: Vec::new(),
                    ..vote.block.clone()
                },
                votes: BTreeMap::new(),
            });
        entry
            .votes
            .entry(vote.origin)
            .or_insert_with(|| vote.signature());
        let weight = stakes.weight_of(entry.votes.keys());
        policy.status(weight, stakes.total())
    }

    pub fn weight(&self, hash: &BlockHash, stakes: &StakeTable) -> u64 {
        self.entries
            .get(hash)
            .map_or(0, |e| stakes.weight_of(e.votes.keys()))
    }

    /// The block with its vote set attached, ordered by voter key.
    pub fn block_with_votes(&self, hash: &BlockHash) -> Option<Block> {
        self.entries
            .get(hash)
            .map(|e| e.block.with_votes(e.votes.values().cloned().collect()))
    }

    pub fn summaries(&self, stakes: &StakeTable) -> Vec<AttestationSummary> {
        let mut out: Vec<AttestationSummary> = self
            .entries
            .iter()
            .map(|(hash, e)| AttestationSummary {
                hash: *hash,
                height: e.block.height,
                origins: e.votes.keys().copied().collect(),
                weight: stakes.weight_of(e.votes.keys()),
            })
            .collect();
        out.sort_by_key(|s| (s.height, s.hash));
        out
    }

    pub fn purge_up_to(&mut self, height: u64) {
        self.entries.retain(|_, e| e.block.height > height);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_crypto::{KeyWallet, Wallet};
    use shroud_ledger::{genesis_block, Command, GenesisPeer, Transaction};
    use shroud_store::Peer;

    fn wallets(n: u8) -> Vec<KeyWallet> {
        (1..=n).map(|i| KeyWallet::from_seed(&[i; 32])).collect()
    }

    fn stakes(ws: &[KeyWallet]) -> StakeTable {
        let peers: Vec<Peer> = ws
            .iter()
            .map(|w| Peer {
                public_key: w.public_key(),
                address: String::new(),
                http: String::new(),
                stake: 1000,
            })
            .collect();
        StakeTable::from_peers(&peers)
    }

    fn block(w: &KeyWallet) -> Block {
        let genesis = genesis_block(&[GenesisPeer {
            public_key: w.public_key(),
            address: "a:1".into(),
            http: "a:2".into(),
            stake: 1000,
        }])
        .unwrap();
        let tx = Transaction::create(w, vec![Command::TestLoad { seq: 1, timestamp: 0 }], None, 1)
            .unwrap();
        Block::next(&genesis, vec![tx]).unwrap()
    }

    #[test]
    fn quorum_needs_distinct_origins() {
        let ws = wallets(7);
        let table = stakes(&ws);
        let policy = QuorumPolicy::default();
        let b = block(&ws[0]);
        let mut pool = VotePool::new();

        let first = Vote::create(&ws[0], b.clone());
        for _ in 0..10 {
            assert!(!pool.add(&first, &table, &policy).is_reached());
        }
        for w in &ws[1..4] {
            assert!(!pool.add(&Vote::create(w, b.clone()), &table, &policy).is_reached());
        }
        let status = pool.add(&Vote::create(&ws[4], b.clone()), &table, &policy);
        assert_eq!(status, QuorumStatus::Reached { weight: 5_000 });

        let sealed = pool.block_with_votes(&b.hash).unwrap();
        assert_eq!(sealed.votes.len(), 5);
        assert_eq!(sealed.hash, b.hash);
    }

    #[test]
    fn unstaked_votes_carry_no_weight() {
        let ws = wallets(3);
        let table = stakes(&ws[..2]);
        let b = block(&ws[0]);
        let mut pool = VotePool::new();
        pool.add(&Vote::create(&ws[2], b.clone()), &table, &QuorumPolicy::default());
        assert_eq!(pool.weight(&b.hash, &table), 0);
        assert_eq!(pool.summaries(&table)[0].origins, vec![ws[2].public_key()]);
    }

    #[test]
    fn summaries_and_purge() {
        let ws = wallets(2);
        let table = stakes(&ws);
        let b = block(&ws[0]);
        let mut pool = VotePool::new();
        pool.add(&Vote::create(&ws[1], b.clone()), &table, &QuorumPolicy::default());
        let rows = pool.summaries(&table);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].weight, 1000);
        assert_eq!(rows[0].origins, vec![ws[1].public_key()]);
        pool.purge_up_to(1);
        assert!(pool.is_empty());
    }
}
