/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The bytes are not a valid chunk encoding.
    #[error("chunk decode failed: {0}")]
    Decode(String),

    /// Failure while producing a canonical encoding.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure (corruption, unavailability).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
