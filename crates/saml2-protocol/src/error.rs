//! SAML error types.
//!
//! One error enum covers the four failure families of the engine: format
//! violations (carrying the exact rule text), security failures,
//! configuration problems and transport/parse failures.

use thiserror::Error;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML engine errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// A message violates a SAML structural or content rule. The message is
    /// the exact rule text.
    #[error("{0}")]
    Format(String),

    /// Missing or invalid signature, untrusted issuer, replayed or
    /// unsolicited message.
    #[error("security error: {0}")]
    Security(String),

    /// Missing or inconsistent configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed XML.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate compression or decompression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// A caller passed an argument of the wrong shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation cannot be performed in the current state.
    #[error("{0}")]
    InvalidOperation(String),

    /// Unknown or unsupported binding.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),

    /// The identity provider is not configured.
    #[error("unknown identity provider: {0}")]
    UnknownIdentityProvider(String),

    /// Outbound HTTP call failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Cryptographic operation error.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Artifact or session store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SamlError {
    /// Shorthand for a [`SamlError::Format`] error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    /// Returns the SAML status code to report for this error.
    #[must_use]
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Format(_)
            | Self::XmlParse(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::InvalidArgument(_)
            | Self::Security(_) => "urn:oasis:names:tc:SAML:2.0:status:Requester",
            Self::UnsupportedBinding(_) => "urn:oasis:names:tc:SAML:2.0:status:RequestUnsupported",
            Self::UnknownIdentityProvider(_) => {
                "urn:oasis:names:tc:SAML:2.0:status:UnknownPrincipal"
            }
            _ => "urn:oasis:names:tc:SAML:2.0:status:Responder",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Format(_)
            | Self::XmlParse(_)
            | Self::Base64Decode(_)
            | Self::Deflate(_)
            | Self::InvalidArgument(_)
            | Self::UnsupportedBinding(_) => 400,
            Self::Security(_) => 403,
            Self::UnknownIdentityProvider(_) => 404,
            Self::Transport(_) => 502,
            _ => 500,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<saml2_crypto::CryptoError> for SamlError {
    fn from(err: saml2_crypto::CryptoError) -> Self {
        Self::Crypto(err.to_string())
    }
}

impl From<saml2_cache::CacheError> for SamlError {
    fn from(err: saml2_cache::CacheError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for SamlError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
