use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("constitution document not found at {0}")]
    MissingDocument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrustError>;
