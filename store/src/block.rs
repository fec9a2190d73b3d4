//! Block storage trait.

use crate::StoreError;
use shroud_ledger::{Block, Transaction};
use shroud_types::PublicKey;

pub trait BlockStore {
    /// Append a finalized block. Fails with [`StoreError::Conflict`] unless
    /// the block extends the current tip.
    fn append(&mut self, block: Block) -> Result<(), StoreError>;

    /// Blocks with `from <= height <= to`, ascending.
    fn get_range(&self, from: u64, to: u64) -> Result<Vec<Block>, StoreError>;

    /// Find a finalized transaction by origin and ident.
    fn find_transaction(&self, origin: &PublicKey, ident: &str) -> Option<Transaction>;
}
