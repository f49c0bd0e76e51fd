//! HTTP-Redirect Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-Redirect binding for sending SAML messages
//! via URL query parameters with DEFLATE compression.

use base64::Engine;

use crate::error::{SamlError, SamlResult};
use crate::signature::{verify_query_signature, VerificationKey, XmlSigner};
use crate::xml::XmlDocument;

use super::{deflate_compress, deflate_decompress, utf8_message, SamlMessageType};

/// Builds the query string of an HTTP-Redirect message.
#[derive(Default)]
pub struct RedirectBindingBuilder<'a> {
    message: Option<(SamlMessageType, String)>,
    relay_state: Option<String>,
    signer: Option<XmlSigner<'a>>,
}

impl<'a> RedirectBindingBuilder<'a> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request XML.
    ///
    /// Fails if a request or response has already been set.
    pub fn with_request(self, xml: impl Into<String>) -> SamlResult<Self> {
        self.with_message(SamlMessageType::Request, xml.into())
    }

    /// Sets the response XML.
    ///
    /// Fails if a request or response has already been set.
    pub fn with_response(self, xml: impl Into<String>) -> SamlResult<Self> {
        self.with_message(SamlMessageType::Response, xml.into())
    }

    fn with_message(mut self, message_type: SamlMessageType, xml: String) -> SamlResult<Self> {
        if let Some((existing, _)) = &self.message {
            return Err(SamlError::InvalidOperation(format!(
                "{} is already set; a redirect carries either a request or a response",
                existing.form_param()
            )));
        }
        self.message = Some((message_type, xml));
        Ok(self)
    }

    /// Sets the RelayState.
    #[must_use]
    pub fn with_relay_state(mut self, relay_state: impl Into<String>) -> Self {
        self.relay_state = Some(relay_state.into());
        self
    }

    /// Signs the query with the given signer.
    #[must_use]
    pub fn with_signer(mut self, signer: XmlSigner<'a>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Produces `SAMLRequest|SAMLResponse=...[&RelayState=...][&SigAlg=...&Signature=...]`.
    ///
    /// The signature covers the URL-encoded parameters in exactly that order.
    pub fn to_query(&self) -> SamlResult<String> {
        let (message_type, xml) = self.message.as_ref().ok_or_else(|| {
            SamlError::InvalidOperation("no request or response has been set".to_string())
        })?;

        // DEFLATE compress, then base64 and URL encode
        let compressed = deflate_compress(xml.as_bytes())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(compressed);
        let mut query = format!(
            "{}={}",
            message_type.form_param(),
            urlencoding::encode(&encoded)
        );

        if let Some(rs) = &self.relay_state {
            query.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
        }

        if let Some(signer) = &self.signer {
            query.push_str(&format!(
                "&SigAlg={}",
                urlencoding::encode(signer.algorithm().uri())
            ));
            let signature = signer.sign_redirect_query(&query)?;
            query.push_str(&format!("&Signature={}", urlencoding::encode(&signature)));
        }

        Ok(query)
    }

    /// Appends the query to `destination`.
    pub fn to_url(&self, destination: &str) -> SamlResult<String> {
        let separator = if destination.contains('?') { '&' } else { '?' };
        Ok(format!("{destination}{separator}{}", self.to_query()?))
    }
}

/// A message received with the HTTP-Redirect binding.
#[derive(Debug, Clone)]
pub struct RedirectBindingParser {
    message: String,
    document: XmlDocument,
    message_type: SamlMessageType,
    relay_state: Option<String>,
    sig_alg: Option<String>,
    signature: Option<String>,
    signed_octets: Option<String>,
}

impl RedirectBindingParser {
    /// Parses the full request URL.
    pub fn from_url(url: &str) -> SamlResult<Self> {
        let query = url
            .split_once('?')
            .map(|(_, query)| query)
            .ok_or_else(|| SamlError::InvalidArgument("URL has no query string".to_string()))?;
        Self::from_query(query)
    }

    /// Parses a raw, still URL-encoded, query string.
    pub fn from_query(query: &str) -> SamlResult<Self> {
        let query = query.split_once('#').map_or(query, |(query, _)| query);

        let mut message: Option<(SamlMessageType, &str)> = None;
        let mut relay_state = None;
        let mut sig_alg = None;
        let mut signature = None;

        for component in query.split('&').filter(|c| !c.is_empty()) {
            let (key, value) = component.split_once('=').unwrap_or((component, ""));
            match key {
                "SAMLRequest" => message = Some((SamlMessageType::Request, value)),
                "SAMLResponse" => message = Some((SamlMessageType::Response, value)),
                "RelayState" => relay_state = Some(value),
                "SigAlg" => sig_alg = Some(value),
                "Signature" => signature = Some(value),
                _ => {}
            }
        }

        let (message_type, raw_message) = message.ok_or_else(|| {
            SamlError::InvalidArgument("No SAMLRequest or SAMLResponse parameter".to_string())
        })?;

        // The signed octets are the components exactly as received
        let signed_octets = sig_alg.map(|raw_sig_alg| {
            let mut octets = format!("{}={raw_message}", message_type.form_param());
            if let Some(raw_relay_state) = relay_state {
                octets.push_str(&format!("&RelayState={raw_relay_state}"));
            }
            octets.push_str(&format!("&SigAlg={raw_sig_alg}"));
            octets
        });

        // URL decode, base64 decode, then inflate
        let compressed = base64::engine::general_purpose::STANDARD
            .decode(decode_component(raw_message)?)
            .map_err(|e| SamlError::Base64Decode(e.to_string()))?;
        let message = utf8_message(deflate_decompress(&compressed)?)?;
        let document = XmlDocument::parse(&message)?;

        Ok(Self {
            message,
            document,
            message_type,
            relay_state: relay_state.map(decode_component).transpose()?,
            sig_alg: sig_alg.map(decode_component).transpose()?,
            signature: signature.map(decode_component).transpose()?,
            signed_octets,
        })
    }

    /// The inflated message XML.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The parsed message.
    #[must_use]
    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// Whether the query carried `SAMLRequest` or `SAMLResponse`.
    #[must_use]
    pub fn message_type(&self) -> SamlMessageType {
        self.message_type
    }

    /// The decoded RelayState. `Some("")` when present but empty.
    #[must_use]
    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_deref()
    }

    /// The decoded `SigAlg` URI.
    #[must_use]
    pub fn sig_alg(&self) -> Option<&str> {
        self.sig_alg.as_deref()
    }

    /// Returns true if the query carries both `SigAlg` and `Signature`.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.sig_alg.is_some() && self.signature.is_some()
    }

    /// Verifies the query signature against any of `keys`.
    #[must_use]
    pub fn verify_signature(&self, keys: &[VerificationKey]) -> bool {
        match (&self.signed_octets, &self.sig_alg, &self.signature) {
            (Some(octets), Some(sig_alg), Some(signature)) => {
                verify_query_signature(octets, sig_alg, signature, keys)
            }
            _ => false,
        }
    }
}

fn decode_component(raw: &str) -> SamlResult<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .map_err(|e| SamlError::InvalidArgument(format!("URL decode error: {e}")))
}
