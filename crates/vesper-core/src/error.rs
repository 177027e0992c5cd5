use thiserror::Error;

#[derive(Debug, Error)]
pub enum VesperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("WebSocket protocol error: {0}")]
    Protocol(String),

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("User not found: {id}")]
    UserNotFound { id: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Channel error ({channel}): {reason}")]
    Channel { channel: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VesperError {
    /// Short error code string sent to clients in WS RES frames.
    pub fn code(&self) -> &'static str {
        match self {
            VesperError::Config(_) => "CONFIG_ERROR",
            VesperError::AuthFailed(_) => "AUTH_FAILED",
            VesperError::Protocol(_) => "PROTOCOL_ERROR",
            VesperError::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            VesperError::PermissionDenied { .. } => "PERMISSION_DENIED",
            VesperError::UserNotFound { .. } => "USER_NOT_FOUND",
            VesperError::Database(_) => "DATABASE_ERROR",
            VesperError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
            VesperError::Channel { .. } => "CHANNEL_ERROR",
            VesperError::Serialization(_) => "SERIALIZATION_ERROR",
            VesperError::Io(_) => "IO_ERROR",
            VesperError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            VesperError::Timeout { .. } => "TIMEOUT",
            VesperError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, VesperError>;
