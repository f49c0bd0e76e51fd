//! SAML artifact codec.
//!
//! A type 4 artifact is 44 bytes: type code (2, big-endian), endpoint
//! index (2, big-endian), SHA-1 hash of the source entity ID (20) and a
//! random message handle (20). It travels base64 encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{SamlError, SamlResult};

/// The artifact type code used by the HTTP Artifact binding.
pub const ARTIFACT_TYPE_CODE: i16 = 4;

/// Length in bytes of a decoded type 4 artifact.
pub const ARTIFACT_LENGTH: usize = 44;

/// Length in bytes of the source ID hash and of the message handle.
pub const HANDLE_LENGTH: usize = 20;

/// Encodes an artifact. Both byte arrays must be exactly 20 bytes.
pub fn create_artifact(
    type_code: i16,
    endpoint_index: i16,
    source_id_hash: &[u8],
    message_handle: &[u8],
) -> SamlResult<String> {
    if source_id_hash.len() != HANDLE_LENGTH {
        return Err(SamlError::InvalidArgument(format!(
            "source id hash must be {HANDLE_LENGTH} bytes, got {}",
            source_id_hash.len()
        )));
    }
    if message_handle.len() != HANDLE_LENGTH {
        return Err(SamlError::InvalidArgument(format!(
            "message handle must be {HANDLE_LENGTH} bytes, got {}",
            message_handle.len()
        )));
    }

    let mut bytes = Vec::with_capacity(ARTIFACT_LENGTH);
    bytes.extend_from_slice(&type_code.to_be_bytes());
    bytes.extend_from_slice(&endpoint_index.to_be_bytes());
    bytes.extend_from_slice(source_id_hash);
    bytes.extend_from_slice(message_handle);
    Ok(STANDARD.encode(bytes))
}

/// Decodes an artifact into the caller's buffers, returning the type code
/// and endpoint index.
///
/// Returns `None` instead of failing when the artifact is not valid base64,
/// does not decode to 44 bytes, or a buffer is not 20 bytes long.
pub fn try_parse_artifact(
    artifact: &str,
    source_id_hash: &mut [u8],
    message_handle: &mut [u8],
) -> Option<(i16, i16)> {
    if source_id_hash.len() != HANDLE_LENGTH || message_handle.len() != HANDLE_LENGTH {
        return None;
    }
    let bytes = STANDARD.decode(artifact.trim()).ok()?;
    if bytes.len() != ARTIFACT_LENGTH {
        return None;
    }

    let type_code = i16::from_be_bytes([bytes[0], bytes[1]]);
    let endpoint_index = i16::from_be_bytes([bytes[2], bytes[3]]);
    source_id_hash.copy_from_slice(&bytes[4..24]);
    message_handle.copy_from_slice(&bytes[24..44]);
    Some((type_code, endpoint_index))
}

/// Strict variant of [`try_parse_artifact`].
pub fn parse_artifact(
    artifact: &str,
    source_id_hash: &mut [u8],
    message_handle: &mut [u8],
) -> SamlResult<(i16, i16)> {
    if source_id_hash.len() != HANDLE_LENGTH {
        return Err(SamlError::InvalidArgument(format!(
            "source id hash buffer must be {HANDLE_LENGTH} bytes, got {}",
            source_id_hash.len()
        )));
    }
    if message_handle.len() != HANDLE_LENGTH {
        return Err(SamlError::InvalidArgument(format!(
            "message handle buffer must be {HANDLE_LENGTH} bytes, got {}",
            message_handle.len()
        )));
    }
    try_parse_artifact(artifact, source_id_hash, message_handle).ok_or_else(|| {
        SamlError::InvalidArgument(format!(
            "artifact does not decode to {ARTIFACT_LENGTH} bytes"
        ))
    })
}

/// SHA-1 of the UTF-8 source identifier.
#[must_use]
pub fn generate_source_id_hash(source_id: &str) -> [u8; HANDLE_LENGTH] {
    saml2_crypto::sha1(source_id.as_bytes())
}

/// A fresh random message handle.
#[must_use]
pub fn generate_message_handle() -> [u8; HANDLE_LENGTH] {
    saml2_crypto::random_handle()
}

/// A decoded type 4 artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    endpoint_index: i16,
    source_id_hash: [u8; HANDLE_LENGTH],
    message_handle: [u8; HANDLE_LENGTH],
}

impl Artifact {
    /// A new artifact for a message issued by `source_id`.
    #[must_use]
    pub fn new(endpoint_index: i16, source_id: &str) -> Self {
        Self {
            endpoint_index,
            source_id_hash: generate_source_id_hash(source_id),
            message_handle: generate_message_handle(),
        }
    }

    /// Decodes an artifact, rejecting any type code other than 4.
    pub fn parse(artifact: &str) -> SamlResult<Self> {
        let mut source_id_hash = [0u8; HANDLE_LENGTH];
        let mut message_handle = [0u8; HANDLE_LENGTH];
        let (type_code, endpoint_index) =
            parse_artifact(artifact, &mut source_id_hash, &mut message_handle)?;
        if type_code != ARTIFACT_TYPE_CODE {
            return Err(SamlError::InvalidArgument(format!(
                "unsupported artifact type code {type_code}"
            )));
        }
        Ok(Self {
            endpoint_index,
            source_id_hash,
            message_handle,
        })
    }

    /// The endpoint index the artifact should be resolved at.
    #[must_use]
    pub const fn endpoint_index(&self) -> i16 {
        self.endpoint_index
    }

    /// SHA-1 hash of the issuer's entity ID.
    #[must_use]
    pub const fn source_id_hash(&self) -> &[u8; HANDLE_LENGTH] {
        &self.source_id_hash
    }

    /// The random message handle.
    #[must_use]
    pub const fn message_handle(&self) -> &[u8; HANDLE_LENGTH] {
        &self.message_handle
    }

    /// Returns true if the artifact was issued by `source_id`.
    #[must_use]
    pub fn is_from(&self, source_id: &str) -> bool {
        self.source_id_hash == generate_source_id_hash(source_id)
    }

    /// The base64 transport form.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(ARTIFACT_LENGTH);
        bytes.extend_from_slice(&ARTIFACT_TYPE_CODE.to_be_bytes());
        bytes.extend_from_slice(&self.endpoint_index.to_be_bytes());
        bytes.extend_from_slice(&self.source_id_hash);
        bytes.extend_from_slice(&self.message_handle);
        STANDARD.encode(bytes)
    }
}
