//! SAML bindings implementation.
//!
//! This module implements the SAML 2.0 bindings for message transport:
//!
//! - **HTTP-Redirect Binding** - Messages are deflated, base64-encoded, and URL-encoded;
//!   signatures travel as `SigAlg`/`Signature` query parameters
//! - **HTTP-POST Binding** - Messages are base64-encoded and sent in HTML forms
//! - **HTTP-Artifact Binding** - A 44-byte artifact travels through the browser and
//!   the message itself is fetched over SOAP
//! - **SOAP Binding** - Messages wrapped in a SOAP 1.1 envelope on the back channel
//!
//! Parsers are read-only: they decode and expose a message and its signature
//! checks but never perform I/O.
//!
//! # Usage
//!
//! ```rust,ignore
//! use saml2_protocol::bindings::{RedirectBindingBuilder, RedirectBindingParser};
//!
//! let query = RedirectBindingBuilder::new()
//!     .with_request(&request_xml)?
//!     .with_relay_state("state")
//!     .with_signer(signer)
//!     .to_query()?;
//!
//! let parser = RedirectBindingParser::from_url(&format!("https://sp/acs?{query}"))?;
//! assert!(parser.verify_signature(&keys));
//! ```

mod artifact;
mod client;
mod post;
mod redirect;
mod soap;

pub use artifact::*;
pub use client::*;
pub use post::*;
pub use redirect::*;
pub use soap::*;

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{SamlError, SamlResult};
use crate::types::{
    ArtifactResolve, ArtifactResponse, AttributeQuery, AuthnRequest, LogoutRequest, LogoutResponse,
};
use crate::xml::Element;

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// A request message (AuthnRequest, LogoutRequest).
    Request,
    /// A response message (Response, LogoutResponse).
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// A protocol message the service provider signs and sends.
pub trait OutboundMessage {
    /// The message `ID`, the reference of its signature.
    fn message_id(&self) -> &str;

    /// The unsigned message element.
    fn message_element(&self) -> Element;
}

macro_rules! outbound_message {
    ($($ty:ty),+ $(,)?) => {
        $(impl OutboundMessage for $ty {
            fn message_id(&self) -> &str {
                &self.id
            }

            fn message_element(&self) -> Element {
                self.to_element()
            }
        })+
    };
}

outbound_message!(
    AuthnRequest,
    LogoutRequest,
    LogoutResponse,
    ArtifactResolve,
    ArtifactResponse,
    AttributeQuery,
);

/// Compresses data using DEFLATE (raw, no zlib header).
pub(crate) fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Deflate(format!("Compression error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Deflate(format!("Compression finish error: {e}")))
}

/// Largest message accepted from a DEFLATE-encoded parameter.
pub const MAX_INFLATED_SIZE: usize = 1024 * 1024;

/// Decompresses raw DEFLATE data of at most [`MAX_INFLATED_SIZE`] bytes.
pub(crate) fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let limit = MAX_INFLATED_SIZE as u64 + 1;
    let mut decoder = DeflateDecoder::new(data).take(limit);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| SamlError::Deflate(format!("Decompression error: {e}")))?;
    if decompressed.len() > MAX_INFLATED_SIZE {
        return Err(SamlError::Deflate(format!(
            "Inflated message exceeds {MAX_INFLATED_SIZE} bytes"
        )));
    }
    Ok(decompressed)
}

/// Decodes a UTF-8 message, rejecting invalid byte sequences.
pub(crate) fn utf8_message(bytes: Vec<u8>) -> SamlResult<String> {
    String::from_utf8(bytes)
        .map_err(|e| SamlError::InvalidArgument(format!("Invalid UTF-8 in message: {e}")))
}
