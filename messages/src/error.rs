use thiserror::Error;

/// Why an inbound frame could not be turned into a message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,

    #[error("frame of {size} bytes exceeds {max}")]
    TooLarge { size: usize, max: usize },

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("malformed ping: {0}")]
    MalformedPing(String),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("envelope exceeds {max} bytes")]
    TooLarge { max: usize },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for EncodeError {
    fn from(e: bincode::Error) -> Self {
        match *e {
            bincode::ErrorKind::SizeLimit => Self::TooLarge {
                max: crate::codec::MAX_DATAGRAM_SIZE,
            },
            other => Self::Serialization(other.to_string()),
        }
    }
}

impl From<shroud_ledger::LedgerError> for EncodeError {
    fn from(e: shroud_ledger::LedgerError) -> Self {
        Self::Serialization(e.to_string())
    }
}
