//! Candidate blocks for upcoming heights.
//!
//! One proposal per `(height, proposer)`. Blocks first seen inside a vote
//! have no known proposer and are kept as anonymous candidates.

use std::collections::{BTreeMap, HashMap};

use shroud_ledger::Block;
use shroud_types::{BlockHash, PublicKey};

#[derive(Debug, Default)]
pub struct BlockPool {
    proposals: BTreeMap<(u64, PublicKey), BlockHash>,
    blocks: HashMap<BlockHash, Block>,
}

impl BlockPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a proposal. Returns `false` if `proposer` already proposed at
    /// this height.
    pub fn propose(&mut self, proposer: PublicKey, block: Block) -> bool {
        let key = (block.height, proposer);
        if self.proposals.contains_key(&key) {
            return false;
        }
        self.proposals.insert(key, block.hash);
        self.candidate(block);
        true
    }

    /// Record a block without a proposer.
    pub fn candidate(&mut self, block: Block) {
        self.blocks.entry(block.hash).or_insert(block);
    }

    pub fn get(&self, hash: &BlockHash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn at_height(&self, height: u64) -> Vec<&Block> {
        let mut out: Vec<&Block> = self.blocks.values().filter(|b| b.height == height).collect();
        out.sort_by_key(|b| b.hash);
        out
    }

    /// All blocks ordered by height then hash.
    pub fn blocks(&self) -> Vec<&Block> {
        let mut out: Vec<&Block> = self.blocks.values().collect();
        out.sort_by_key(|b| (b.height, b.hash));
        out
    }

    pub fn proposer_of(&self, hash: &BlockHash) -> Option<PublicKey> {
        self.proposals
            .iter()
            .find(|(_, h)| *h == hash)
            .map(|((_, pk), _)| *pk)
    }

    pub fn purge_up_to(&mut self, height: u64) {
        self.proposals.retain(|(h, _), _| *h > height);
        self.blocks.retain(|_, b| b.height > height);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_crypto::{KeyWallet, Wallet};
    use shroud_ledger::{genesis_block, Command, GenesisPeer, Transaction};

    fn block(w: &KeyWallet, ident: &str) -> Block {
        let genesis = genesis_block(&[GenesisPeer {
            public_key: w.public_key(),
            address: "a:1".into(),
            http: "a:2".into(),
            stake: 1000,
        }])
        .unwrap();
        let tx = Transaction::create(w, vec![Command::TestLoad { seq: 1, timestamp: 0 }], Some(ident), 1)
            .unwrap();
        Block::next(&genesis, vec![tx]).unwrap()
    }

    #[test]
    fn one_proposal_per_height_and_proposer() {
        let w = KeyWallet::from_seed(&[1; 32]);
        let mut pool = BlockPool::new();
        assert!(pool.propose(w.public_key(), block(&w, "a")));
        assert!(!pool.propose(w.public_key(), block(&w, "b")));
        assert!(pool.propose(PublicKey([9; 32]), block(&w, "b")));
        assert_eq!(pool.at_height(1).len(), 2);
        let a = block(&w, "a");
        assert_eq!(pool.proposer_of(&a.hash), Some(w.public_key()));
    }

    #[test]
    fn purge_drops_finalized_heights() {
        let w = KeyWallet::from_seed(&[1; 32]);
        let mut pool = BlockPool::new();
        pool.candidate(block(&w, "a"));
        pool.purge_up_to(0);
        assert_eq!(pool.len(), 1);
        pool.purge_up_to(1);
        assert!(pool.is_empty());
    }
}
