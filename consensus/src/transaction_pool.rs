//! Locally submitted transactions.
//!
//! Two tiers: the *stack* holds transactions waiting for a proposal, the
//! *pool* holds the ones inside the in-flight local proposal. A transaction
//! leaves both tiers only when a finalized block contains it.

use shroud_ledger::{Block, Transaction, MAX_TRANSACTIONS};

use crate::error::ConsensusError;

#[derive(Debug, Default)]
pub struct TransactionPool {
    stack: Vec<Transaction>,
    pool: Vec<Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transaction for the next proposal. `(origin, ident)` must be
    /// unique across both tiers.
    pub fn stack(&mut self, tx: Transaction) -> Result<(), ConsensusError> {
        let known = self
            .stack
            .iter()
            .chain(self.pool.iter())
            .any(|t| t.origin == tx.origin && t.ident == tx.ident);
        if known {
            return Err(ConsensusError::DuplicateTransaction {
                origin: tx.origin.to_string(),
                ident: tx.ident,
            });
        }
        self.stack.push(tx);
        Ok(())
    }

    pub fn stacked(&self) -> &[Transaction] {
        &self.stack
    }

    pub fn pooled(&self) -> &[Transaction] {
        &self.pool
    }

    pub fn is_proposing(&self) -> bool {
        !self.pool.is_empty()
    }

    /// Move up to one block's worth of stacked transactions into the pool.
    /// Returns nothing while a proposal is already in flight.
    pub fn take_for_proposal(&mut self) -> Vec<Transaction> {
        if self.is_proposing() || self.stack.is_empty() {
            return Vec::new();
        }
        let n = self.stack.len().min(MAX_TRANSACTIONS);
        self.pool = self.stack.drain(..n).collect();
        self.pool.clone()
    }

    /// Abandon the in-flight proposal: its transactions go back to the
    /// front of the stack in their original order.
    pub fn release(&mut self) {
        if self.pool.is_empty() {
            return;
        }
        let mut restored = std::mem::take(&mut self.pool);
        restored.append(&mut self.stack);
        self.stack = restored;
    }

    /// Drop everything `block` contains, then return the rest of the pool
    /// to the stack. Returns how many local transactions were finalized.
    pub fn finalize(&mut self, block: &Block) -> usize {
        let before = self.stack.len() + self.pool.len();
        self.stack.retain(|t| !block.contains(&t.origin, &t.ident));
        self.pool.retain(|t| !block.contains(&t.origin, &t.ident));
        let finalized = before - self.stack.len() - self.pool.len();
        self.release();
        finalized
    }
}
