//! Blocks and block-structure validity.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use shroud_crypto::blake2b_256;
use shroud_types::{BlockHash, PublicKey, Signature};

use crate::error::LedgerError;
use crate::transaction::Transaction;

pub const BLOCK_VERSION: u32 = 1;
pub const MAX_TRANSACTIONS: usize = 256;

/// A vote as attached to a block: the voter and its signature over the
/// block hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSignature {
    pub origin: PublicKey,
    pub sig: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub version: u32,
    pub previous_hash: BlockHash,
    pub height: u64,
    pub transactions: Vec<Transaction>,
    pub hash: BlockHash,
    /// Quorum evidence. Empty on proposals, excluded from `hash`.
    #[serde(default)]
    pub votes: Vec<VoteSignature>,
}

impl Block {
    /// Build the successor of `previous` carrying `transactions`.
    pub fn next(previous: &Block, transactions: Vec<Transaction>) -> Result<Self, LedgerError> {
        Self::assemble(previous.hash, previous.height + 1, transactions)
    }

    pub(crate) fn assemble(
        previous_hash: BlockHash,
        height: u64,
        transactions: Vec<Transaction>,
    ) -> Result<Self, LedgerError> {
        let mut block = Self {
            version: BLOCK_VERSION,
            previous_hash,
            height,
            transactions,
            hash: BlockHash::ZERO,
            votes: Vec::new(),
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    pub fn compute_hash(&self) -> Result<BlockHash, LedgerError> {
        let bytes = bincode::serialize(&(
            self.version,
            &self.previous_hash,
            self.height,
            &self.transactions,
        ))?;
        Ok(BlockHash::new(blake2b_256(&bytes)))
    }

    /// Canonical bytes of the attached vote set, as covered by commit
    /// signatures.
    pub fn votes_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        Ok(bincode::serialize(&self.votes)?)
    }

    /// Copy of this block with `votes` attached.
    pub fn with_votes(&self, votes: Vec<VoteSignature>) -> Self {
        Self {
            votes,
            ..self.clone()
        }
    }

    pub fn contains(&self, origin: &PublicKey, ident: &str) -> bool {
        self.transactions
            .iter()
            .any(|t| &t.origin == origin && t.ident == ident)
    }

    /// Block-structure validity of a non-genesis block: version, linkage
    /// shape, content hash, transaction bounds and validity, no duplicate
    /// `(origin, ident)` pairs. Linkage to the local chain tip is a
    /// separate, stateful check.
    pub fn check(&self) -> Result<(), LedgerError> {
        if self.version != BLOCK_VERSION {
            return Err(LedgerError::block(format!("unknown version {}", self.version)));
        }
        if self.height == 0 || self.previous_hash.is_zero() {
            return Err(LedgerError::block("missing previous block"));
        }
        if self.transactions.is_empty() || self.transactions.len() > MAX_TRANSACTIONS {
            return Err(LedgerError::block("transaction count out of range"));
        }
        if self.compute_hash()? != self.hash {
            return Err(LedgerError::block("hash mismatch"));
        }
        let mut seen = HashSet::with_capacity(self.transactions.len());
        for tx in &self.transactions {
            if !seen.insert((tx.origin, tx.ident.as_str())) {
                return Err(LedgerError::block(format!("duplicate transaction {}", tx.ident)));
            }
            tx.check()?;
        }
        Ok(())
    }
}
