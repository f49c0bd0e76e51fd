//! Cryptographically secure random values.
//!
//! The thread-local generator from `rand` is a CSPRNG seeded from the
//! operating system.

use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Generates `len` random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::rng().fill(&mut bytes[..]);
    bytes
}

/// Generates a 20-byte random handle, as used for artifact message handles.
#[must_use]
pub fn random_handle() -> [u8; 20] {
    let mut handle = [0u8; 20];
    rand::rng().fill(&mut handle);
    handle
}

/// Generates a random alphanumeric string of `len` characters.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::rng(), len)
}

/// Generates an XML document identifier.
///
/// The value starts with a letter so it is a valid `xs:ID`, followed by
/// 32 alphanumeric characters (about 190 bits of entropy).
#[must_use]
pub fn generate_message_id() -> String {
    format!("id{}", random_alphanumeric(32))
}
