use thiserror::Error;

/// Errors from the approval broker. Kept separate from `VesperError` so the
/// gateway can map them to WS response codes without coupling layers.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval request not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("request already decided")]
    AlreadyDecided,
}

pub type Result<T> = std::result::Result<T, ApprovalError>;
