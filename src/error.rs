//! Error types for overtone.

use thiserror::Error;

/// Error type for overtone operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Index {index} out of range ({valid} valid samples)")]
    OutOfRange { index: usize, valid: usize },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
