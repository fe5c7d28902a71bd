//! Error types for the CLI

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lab(#[from] lakelab_common::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Short category printed before the message
    pub fn class(&self) -> &'static str {
        match self {
            Error::Lab(e) => e.class(),
            Error::Io(_) | Error::Json(_) => "io",
        }
    }

    /// Whether re-running the same command may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Lab(e) if e.is_retryable())
    }
}
