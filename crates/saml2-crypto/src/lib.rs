//! # saml2-crypto
//!
//! Cryptographic primitives for the SAML 2.0 engine, built on aws-lc-rs.
//!
//! - [`hash`] - SHA-1 and SHA-2 digests used by XML-DSig and the artifact codec
//! - [`rsa`] - RSA PKCS#1 v1.5 signing keys and public keys
//! - [`certificate`] - X.509 certificate loading and validity checks
//! - [`random`] - message handles and document identifiers
//!
//! SHA-1 is available for digests and signature verification only, as
//! required by the artifact binding and by older identity providers.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod certificate;
mod der;
pub mod error;
pub mod hash;
pub mod random;
pub mod rsa;

pub use certificate::X509Certificate;
pub use error::{CryptoError, CryptoResult};
pub use hash::{digest, sha1, sha256, DigestAlgorithm};
pub use random::{generate_message_id, random_alphanumeric, random_bytes, random_handle};
pub use rsa::{RsaAlgorithm, RsaPublicKey, RsaSigningKey};
