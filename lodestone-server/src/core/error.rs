use thiserror::Error;

/// Error type for storage engine operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Memory limit exceeded")]
    MemoryLimitExceeded,

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;
