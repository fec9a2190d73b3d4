//! The genesis block.
//!
//! Height 0 with a zero previous hash. Every founding peer contributes one
//! transaction holding an `AddPeer` and a `ModifyStake` command. Genesis
//! transactions are not signed: a node trusts its genesis file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use shroud_types::{BlockHash, PublicKey, Signature};

use crate::block::{Block, BLOCK_VERSION};
use crate::command::Command;
use crate::error::LedgerError;
use crate::transaction::Transaction;

/// Stake assigned to founding peers by default.
pub const GENESIS_STAKE: i64 = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisPeer {
    pub public_key: PublicKey,
    pub address: String,
    pub http: String,
    #[serde(default = "default_stake")]
    pub stake: i64,
}

fn default_stake() -> i64 {
    GENESIS_STAKE
}

/// Build the genesis block for a founding peer set.
pub fn genesis_block(peers: &[GenesisPeer]) -> Result<Block, LedgerError> {
    let transactions = peers
        .iter()
        .map(|p| Transaction {
            ident: "genesis".to_string(),
            origin: p.public_key,
            timestamp: 0,
            commands: vec![
                Command::AddPeer {
                    seq: 1,
                    public_key: p.public_key,
                    address: p.address.clone(),
                    http: p.http.clone(),
                },
                Command::ModifyStake {
                    seq: 2,
                    public_key: p.public_key,
                    stake: p.stake,
                },
            ],
            sig: Signature([0u8; 64]),
        })
        .collect();
    Block::assemble(BlockHash::ZERO, 0, transactions)
}

/// Read a genesis block from a JSON file and check it.
pub fn load_genesis(path: &Path) -> Result<Block, LedgerError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| LedgerError::Genesis(format!("{}: {e}", path.display())))?;
    let block: Block =
        serde_json::from_str(&raw).map_err(|e| LedgerError::Genesis(e.to_string()))?;
    check_genesis(&block)?;
    Ok(block)
}

pub fn check_genesis(block: &Block) -> Result<(), LedgerError> {
    if block.version != BLOCK_VERSION || block.height != 0 || !block.previous_hash.is_zero() {
        return Err(LedgerError::Genesis("not a genesis block".into()));
    }
    if block.compute_hash()? != block.hash {
        return Err(LedgerError::Genesis("hash mismatch".into()));
    }
    for tx in &block.transactions {
        tx.check_structure()?;
    }
    Ok(())
}
