use thiserror::Error;

/// Main error type for the hive engine
#[derive(Error, Debug)]
pub enum HiveError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Market feed unavailable: {0}")]
    FeedUnavailable(String),

    // Record store errors
    #[error("Write rejected: {0}")]
    Write(String),

    // Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Agent not found: {0}")]
    AgentNotFound(uuid::Uuid),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl HiveError {
    /// Wrap a store failure as a write rejection
    pub fn write(err: impl std::fmt::Display) -> Self {
        HiveError::Write(err.to_string())
    }

    /// Wrap a market source failure
    pub fn feed(err: impl std::fmt::Display) -> Self {
        HiveError::FeedUnavailable(err.to_string())
    }

    /// True for failures the store raised while persisting a change
    pub fn is_write(&self) -> bool {
        matches!(self, HiveError::Write(_) | HiveError::Database(_))
    }
}

/// Result type alias for HiveError
pub type Result<T> = std::result::Result<T, HiveError>;
