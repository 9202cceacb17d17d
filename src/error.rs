use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("credential store: {0}")]
    Credential(#[from] CredentialError),

    #[error("worker queue is full")]
    QueueFull,

    #[error("header assembly exceeded the write buffer")]
    HeaderOverflow,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("username already registered")]
    Duplicate,

    #[error("persistent store lease could not be acquired")]
    LeaseUnavailable,

    #[error("persistent store failure: {0}")]
    Store(String),
}
