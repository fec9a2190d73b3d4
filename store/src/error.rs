use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The block does not extend the current tip.
    #[error("conflict at height {height}: {reason}")]
    Conflict { height: u64, reason: String },

    #[error("height {0} not found")]
    NotFound(u64),

    #[error("invalid genesis: {0}")]
    Genesis(String),
}
