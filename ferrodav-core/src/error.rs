use std::io;

use thiserror::Error;

/// Failure raised by a storage backend while servicing a single call.
///
/// Backends report failures through this type instead of panicking;
/// the engine captures the error into the outcome of the node where
/// the call happened and keeps traversing.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("access denied: {0}")]
    Denied(String),
    #[error("conflicting resource state: {0}")]
    Conflict(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    pub fn storage(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(error))
    }
}
