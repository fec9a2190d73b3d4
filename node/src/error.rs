use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] shroud_crypto::CryptoError),

    #[error("ledger error: {0}")]
    Ledger(#[from] shroud_ledger::LedgerError),

    #[error("store error: {0}")]
    Store(#[from] shroud_store::StoreError),

    #[error("network error: {0}")]
    Network(#[from] shroud_network::NetworkError),

    #[error("consensus error: {0}")]
    Consensus(#[from] shroud_consensus::ConsensusError),

    #[error("encode error: {0}")]
    Encode(#[from] shroud_messages::EncodeError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("join rejected: {0}")]
    Join(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("node runtime stopped")]
    Stopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
