//! Error types for tgshare

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tgshare operations
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration is present but unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record store failure
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Transport-level failure talking to the Bot API
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected Bot API response shape
    #[error("Telegram error: {0}")]
    Telegram(String),

    /// Bot API answered with `ok: false`
    #[error("Telegram API error {code}: {description}")]
    TelegramApi { code: u16, description: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Share link not found: {0}")]
    ShareLinkNotFound(String),

    /// Share token already mapped to another record
    #[error("Share link already in use: {0}")]
    ShareLinkTaken(String),

    #[error("Could not allocate a unique share link after {0} attempts")]
    ShareLinkExhausted(u32),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// Request body cut off by the server's body limit
    #[error("Request body exceeds the {0} byte limit")]
    BodyLimit(u64),

    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    /// Chunk does not agree with the session it claims to belong to
    #[error("Upload session mismatch: {0}")]
    SessionMismatch(String),

    #[error("Upload session not found: {0}")]
    SessionNotFound(String),

    /// Chunk for a session that was already assembled
    #[error("Upload session already completed: {0}")]
    SessionCompleted(String),

    /// Session count or buffered bytes at their configured limit
    #[error("Upload capacity reached: {0}")]
    UploadCapacity(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Deserialization(e.to_string())
    }
}

impl Error {
    /// Whether a failed Telegram call is worth repeating
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::TelegramApi { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// Like [`Error::is_retryable`], for calls that post a message
    ///
    /// A send that timed out may already be in the channel, so only
    /// failures to connect are repeated.
    pub fn is_retryable_send(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect(),
            _ => self.is_retryable(),
        }
    }
}
