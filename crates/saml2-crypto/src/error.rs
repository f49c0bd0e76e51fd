//! Crypto error types.

use thiserror::Error;

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by key loading and signing.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The key material could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The certificate could not be parsed.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The algorithm is not available for the requested operation.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}
