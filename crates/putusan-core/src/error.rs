use thiserror::Error;

/// Fatal error types for putusan.
///
/// Ordinary network and HTTP failures never show up here: they are
/// classified into a [`FetchStatus`](crate::models::FetchStatus) by the
/// orchestrator. An `AppError` means the run itself cannot continue.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed policy or configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The checkpoint record could not be written.
    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    /// A downstream sink rejected an outcome.
    #[error("Sink error: {0}")]
    SinkError(String),

    /// HTTP client could not be constructed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Headless browser could not be configured or launched.
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Returns true if the error comes from user-supplied configuration
    /// rather than from the environment at run time.
    pub fn is_config(&self) -> bool {
        matches!(self, AppError::ConfigError(_))
    }
}
