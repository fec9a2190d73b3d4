use shroud_ledger::LedgerError;
use shroud_messages::EncodeError;
use shroud_store::StoreError;
use thiserror::Error;

/// Why an envelope was refused at the admission gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("envelope signature does not verify for its origin")]
    BadSignature,

    #[error("ident {actual} does not match payload ident {expected}")]
    IdentMismatch { expected: String, actual: String },

    #[error("broadcast flag does not match the message type")]
    BroadcastMismatch,

    #[error("malformed token")]
    BadToken,

    #[error("auth signature does not cover the token")]
    BadAuth,

    #[error("payload origin differs from envelope origin")]
    OriginMismatch,

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("proposed block carries votes")]
    VotesAttached,

    #[error("vote signature does not verify")]
    InvalidVote,

    #[error("commit signature does not verify")]
    InvalidCommit,

    #[error("vote stake {have} below quorum {need}")]
    BelowQuorum { have: u64, need: u64 },
}

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("transaction {origin}/{ident} is already known")]
    DuplicateTransaction { origin: String, ident: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
}
