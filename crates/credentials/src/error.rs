//! Error types for credential discovery

/// Errors from credential discovery.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
