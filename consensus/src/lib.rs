//! Consensus: admission validation, staged pools and the driver that moves a
//! block from proposal to finalization.
//!
//! - [`validation`]: the gate every inbound envelope passes before it is
//!   processed or relayed.
//! - [`quorum`]: stake tables and the quorum threshold.
//! - [`transaction_pool`], [`block_pool`], [`vote_pool`], [`commit_pool`]:
//!   additive pools keyed by content, purged once a height finalizes.
//! - [`driver`]: the synchronous state machine tying them together.

pub mod block_pool;
pub mod commit_pool;
pub mod driver;
pub mod error;
pub mod quorum;
pub mod transaction_pool;
pub mod validation;
pub mod vote_pool;

pub use block_pool::BlockPool;
pub use commit_pool::CommitPool;
pub use driver::{ConsensusDriver, DriverConfig, Step};
pub use error::{ConsensusError, ValidationFailure};
pub use quorum::{AttestationSummary, QuorumPolicy, QuorumStatus, StakeTable, DEFAULT_QUORUM_BPS};
pub use transaction_pool::TransactionPool;
pub use validation::{check_message, validate_message, Validator};
pub use vote_pool::VotePool;
