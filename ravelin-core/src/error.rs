//! Error types for Ravelin

use thiserror::Error;

/// Result type for Ravelin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Ravelin
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
