use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid block: {reason}")]
    InvalidBlock { reason: String },

    #[error("invalid transaction {ident}: {reason}")]
    InvalidTransaction { ident: String, reason: String },

    #[error("invalid command #{seq}: {reason}")]
    InvalidCommand { seq: u32, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("genesis file: {0}")]
    Genesis(String),
}

impl LedgerError {
    pub(crate) fn block(reason: impl Into<String>) -> Self {
        Self::InvalidBlock {
            reason: reason.into(),
        }
    }
}
