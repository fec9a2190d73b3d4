//! Commits per block hash, one stage after the vote pool.
//!
//! The block kept for a hash is the one from the first commit seen, with
//! that commit's vote set as quorum evidence.

use std::collections::{BTreeMap, HashMap};

use shroud_ledger::Block;
use shroud_messages::Commit;
use shroud_types::{BlockHash, PublicKey, Signature};

use crate::quorum::{AttestationSummary, QuorumPolicy, QuorumStatus, StakeTable};

#[derive(Debug)]
struct CommitEntry {
    block: Block,
    commits: BTreeMap<PublicKey, Signature>,
}

#[derive(Debug, Default)]
pub struct CommitPool {
    entries: HashMap<BlockHash, CommitEntry>,
}

impl CommitPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        commit: &Commit,
        stakes: &StakeTable,
        policy: &QuorumPolicy,
    ) -> QuorumStatus {
        let entry = self
            .entries
            .entry(commit.block.hash)
            .or_insert_with(|| CommitEntry {
                block: commit.block.clone(),
                commits: BTreeMap::new(),
            });
        entry.commits.entry(commit.origin).or_insert(commit.sig);
        let weight = stakes.weight_of(entry.commits.keys());
        policy.status(weight, stakes.total())
    }

    pub fn block(&self, hash: &BlockHash) -> Option<&Block> {
        self.entries.get(hash).map(|e| &e.block)
    }

    pub fn has_committed(&self, hash: &BlockHash, origin: &PublicKey) -> bool {
        self.entries
            .get(hash)
            .is_some_and(|e| e.commits.contains_key(origin))
    }

    pub fn summaries(&self, stakes: &StakeTable) -> Vec<AttestationSummary> {
        let mut out: Vec<AttestationSummary> = self
            .entries
            .iter()
            .map(|(hash, e)| AttestationSummary {
                hash: *hash,
                height: e.block.height,
                origins: e.commits.keys().copied().collect(),
                weight: stakes.weight_of(e.commits.keys()),
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
