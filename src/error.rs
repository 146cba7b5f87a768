//! Error types for the geocell registry.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors surfaced by registry operations.
///
/// An unknown geohash is never an error; queries against it return empty
/// sequences.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Input violates a record invariant. Raised before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An otherwise valid write could not be applied. Nothing was mutated.
    #[error("write failed: {0}")]
    WriteFailure(String),

    #[error("registry is closed")]
    RegistryClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid log format")]
    InvalidFormat,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RegistryError {
    pub fn is_validation(&self) -> bool {
        matches!(self, RegistryError::Validation(_))
    }

    pub fn is_write_failure(&self) -> bool {
        matches!(self, RegistryError::WriteFailure(_))
    }
}

#[cfg(feature = "aof")]
impl From<bincode::Error> for RegistryError {
    fn from(err: bincode::Error) -> Self {
        RegistryError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Serialization(err.to_string())
    }
}
