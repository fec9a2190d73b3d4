use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key file i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed key file {path}: {reason}")]
    MalformedKeyFile { path: String, reason: String },
}
