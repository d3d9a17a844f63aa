/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] redis::RedisError),

    /// The remote service answered 404; carries its detail text
    #[error("{0}")]
    NotFound(String),

    /// The remote service answered with any other non-success status
    #[error("{0}")]
    Unavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("First, like a few movies (at least 1).")]
    EmptyLikedSet,

    /// Every item of a fan-out batch failed
    #[error("{0}")]
    BatchFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Detected locally, never reached the network
    Validation,
    /// Network unreachable or non-success status
    Transport,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::EmptyLikedSet | AppError::InvalidInput(_) => ErrorKind::Validation,
            AppError::HttpClient(_)
            | AppError::NotFound(_)
            | AppError::Unavailable(_)
            | AppError::BatchFailed(_) => ErrorKind::Transport,
            AppError::Storage(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
