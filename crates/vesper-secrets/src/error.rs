use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    MissingKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SecretError {
    pub fn code(&self) -> &'static str {
        match self {
            SecretError::MissingKey(_) => "SECRET_MISSING",
            SecretError::Io(_) => "IO_ERROR",
            SecretError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SecretError>;
