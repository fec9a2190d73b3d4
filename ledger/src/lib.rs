//! The chain data model.
//!
//! A block carries an ordered list of signed transactions; each transaction
//! carries a list of commands. Peer-state commands (`AddPeer`, `RemovePeer`,
//! `ModifyStake`) are what the peer directory applies when a block is
//! appended. Block hashes cover everything except the attached vote set,
//! which is quorum evidence added at commit time.

pub mod block;
pub mod command;
pub mod error;
pub mod genesis;
pub mod transaction;

pub use block::{Block, VoteSignature, BLOCK_VERSION, MAX_TRANSACTIONS};
pub use command::Command;
pub use error::LedgerError;
pub use genesis::{check_genesis, genesis_block, load_genesis, GenesisPeer, GENESIS_STAKE};
pub use transaction::{Transaction, MAX_IDENT_LEN};
