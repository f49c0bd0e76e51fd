//! SOAP 1.1 binding.
//!
//! Wraps back-channel messages (artifact resolution, logout, attribute
//! queries) in a minimal `SOAP-ENV:Envelope`.

use crate::error::{SamlError, SamlResult};
use crate::signature::{self, VerificationKey};
use crate::types::{
    prefixes, ArtifactResolve, ArtifactResponse, LogoutRequest, LogoutResponse, Response,
    SAMLP_NS, SOAP_ACTION, SOAP_ENV_NS,
};
use crate::xml::{Element, NamespaceScope, XmlDocument};

/// Content type of SOAP 1.1 requests.
pub const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Builds SOAP envelopes.
pub struct SoapEnvelope;

impl SoapEnvelope {
    /// The `SOAPAction` header value SAML requires.
    pub const ACTION: &'static str = SOAP_ACTION;

    /// Wraps `body` in an envelope.
    #[must_use]
    pub fn wrap(body: Element) -> Element {
        Element::new("SOAP-ENV:Envelope", SOAP_ENV_NS)
            .declare(prefixes::SOAP_ENV, SOAP_ENV_NS)
            .child(Element::new("SOAP-ENV:Body", SOAP_ENV_NS).child(body))
    }

    /// Wraps `body` and serializes the envelope with an XML declaration.
    #[must_use]
    pub fn to_xml(body: Element) -> String {
        XmlDocument::from_root(Self::wrap(body)).to_xml_with_declaration()
    }
}

/// A SAML message received in a SOAP body.
#[derive(Debug, Clone)]
pub struct SoapBindingParser {
    document: XmlDocument,
}

impl SoapBindingParser {
    /// Parses a SOAP envelope and unwraps the message in its body.
    pub fn from_xml(xml: &str) -> SamlResult<Self> {
        let envelope = XmlDocument::parse(xml)?;
        let root = envelope.root();
        if !root.is(SOAP_ENV_NS, "Envelope") {
            return Err(SamlError::format("Expected a SOAP Envelope element"));
        }
        let (body, scope) = root
            .find_with_scope(&NamespaceScope::new(), &|el| el.is(SOAP_ENV_NS, "Body"))
            .ok_or_else(|| SamlError::format("SOAP Envelope has no Body element"))?;
        let body_scope = body.scope(&scope);
        let message = body
            .child_elements()
            .next()
            .ok_or_else(|| SamlError::format("SOAP Body is empty"))?;
        if message.is(SOAP_ENV_NS, "Fault") {
            let fault = message
                .child_elements()
                .find(|el| el.name == "faultstring")
                .map(Element::text_content)
                .unwrap_or_default();
            return Err(SamlError::Transport(format!("SOAP fault: {}", fault.trim())));
        }

        Ok(Self {
            document: XmlDocument::from_root(message.detached(&body_scope)),
        })
    }

    /// Parses raw response bytes.
    pub fn from_bytes(bytes: &[u8]) -> SamlResult<Self> {
        let xml = std::str::from_utf8(bytes)
            .map_err(|e| SamlError::InvalidArgument(format!("Invalid UTF-8 in message: {e}")))?;
        Self::from_xml(xml)
    }

    /// The unwrapped message as its own document.
    #[must_use]
    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// The unwrapped message element.
    #[must_use]
    pub fn message(&self) -> &Element {
        self.document.root()
    }

    /// True if the body holds a `samlp:ArtifactResolve`.
    #[must_use]
    pub fn is_artifact_resolve(&self) -> bool {
        self.message().is(SAMLP_NS, "ArtifactResolve")
    }

    /// True if the body holds a `samlp:ArtifactResponse`.
    #[must_use]
    pub fn is_artifact_response(&self) -> bool {
        self.message().is(SAMLP_NS, "ArtifactResponse")
    }

    /// True if the body holds a `samlp:LogoutRequest`.
    #[must_use]
    pub fn is_logout_request(&self) -> bool {
        self.message().is(SAMLP_NS, "LogoutRequest")
    }

    /// True if the body holds a `samlp:LogoutResponse`.
    #[must_use]
    pub fn is_logout_response(&self) -> bool {
        self.message().is(SAMLP_NS, "LogoutResponse")
    }

    /// True if the body holds a `samlp:Response`.
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.message().is(SAMLP_NS, "Response")
    }

    /// Verifies the unwrapped message's signature against any of `keys`.
    #[must_use]
    pub fn check_saml_message_signature(&self, keys: &[VerificationKey]) -> bool {
        signature::check_signature_with_keys(&self.document, keys)
    }

    /// Reads the body as an `ArtifactResolve`.
    pub fn artifact_resolve(&self) -> SamlResult<ArtifactResolve> {
        ArtifactResolve::from_element(self.message())
    }

    /// Reads the body as an `ArtifactResponse`.
    pub fn artifact_response(&self) -> SamlResult<ArtifactResponse> {
        ArtifactResponse::from_element(self.message())
    }

    /// Reads the body as a `LogoutRequest`.
    pub fn logout_request(&self) -> SamlResult<LogoutRequest> {
        LogoutRequest::from_element(self.message())
    }

    /// Reads the body as a `LogoutResponse`.
    pub fn logout_response(&self) -> SamlResult<LogoutResponse> {
        LogoutResponse::from_element(self.message())
    }

    /// Reads the body as a `Response`.
    pub fn response(&self) -> SamlResult<Response> {
        Response::from_element(self.message())
    }
}
