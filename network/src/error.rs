use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    /// Bind or send failure on the datagram transport.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("transport not ready after {attempts} attempts")]
    NotReady { attempts: u32 },

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("peer {0} not found")]
    PeerNotFound(String),

    #[error("encode error: {0}")]
    Encode(#[from] shroud_messages::EncodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
