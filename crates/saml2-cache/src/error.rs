//! Cache error types.

use std::fmt;

/// Store operation errors.
#[derive(Debug)]
pub enum CacheError {
    /// Connection to a remote backend failed.
    Connection(String),
    /// The key is already present.
    Conflict(String),
    /// Invalid store configuration.
    Configuration(String),
    /// Internal store error.
    Internal(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "cache connection error: {msg}"),
            Self::Conflict(key) => write!(f, "key already present in cache: {key}"),
            Self::Configuration(msg) => write!(f, "cache configuration error: {msg}"),
            Self::Internal(msg) => write!(f, "internal cache error: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

/// Result type for store operations.
pub type CacheResult<T> = Result<T, CacheError>;
