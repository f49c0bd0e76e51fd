//! HTTP-POST Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-POST binding for sending SAML messages
//! via HTML form POST.

use std::sync::Arc;

use base64::Engine;

use crate::error::{SamlError, SamlResult};
use crate::signature::{self, CertificateSpecification, VerificationKey};
use crate::xml::XmlDocument;

use super::{utf8_message, SamlMessageType};

/// Builds the self-submitting form of an HTTP-POST message.
#[derive(Debug, Clone)]
pub struct PostBindingBuilder {
    destination: String,
    message: Option<(SamlMessageType, String)>,
    relay_state: Option<String>,
}

impl PostBindingBuilder {
    /// Creates a builder posting to `destination`.
    #[must_use]
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            message: None,
            relay_state: None,
        }
    }

    /// Sets the request XML.
    #[must_use]
    pub fn with_request(mut self, xml: impl Into<String>) -> Self {
        self.message = Some((SamlMessageType::Request, xml.into()));
        self
    }

    /// Sets the response XML.
    #[must_use]
    pub fn with_response(mut self, xml: impl Into<String>) -> Self {
        self.message = Some((SamlMessageType::Response, xml.into()));
        self
    }

    /// Sets the RelayState.
    #[must_use]
    pub fn with_relay_state(mut self, relay_state: Option<impl Into<String>>) -> Self {
        self.relay_state = relay_state.map(Into::into);
        self
    }

    /// Returns an HTML form that will auto-submit to the destination.
    pub fn to_form(&self) -> SamlResult<String> {
        let (message_type, xml) = self.message.as_ref().ok_or_else(|| {
            SamlError::InvalidOperation("no request or response has been set".to_string())
        })?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(xml);

        let relay_state_input = self
            .relay_state
            .as_deref()
            .map(|rs| {
                format!(
                    r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                    html_escape(rs)
                )
            })
            .unwrap_or_default();

        Ok(format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        <input type="hidden" name="{}" value="{}"/>
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            html_escape(&self.destination),
            message_type.form_param(),
            encoded,
            relay_state_input
        ))
    }
}

/// A message received with the HTTP-POST binding.
#[derive(Debug, Clone)]
pub struct PostBindingParser {
    message: String,
    document: XmlDocument,
    message_type: SamlMessageType,
    relay_state: Option<String>,
}

impl PostBindingParser {
    /// Decodes a SAML message from HTTP-POST form data.
    ///
    /// # Arguments
    ///
    /// * `saml_request` - The SAMLRequest parameter value (if present)
    /// * `saml_response` - The SAMLResponse parameter value (if present)
    /// * `relay_state` - The RelayState parameter value (if present)
    pub fn new(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
    ) -> SamlResult<Self> {
        let (encoded, message_type) = if let Some(req) = saml_request {
            (req, SamlMessageType::Request)
        } else if let Some(resp) = saml_response {
            (resp, SamlMessageType::Response)
        } else {
            return Err(SamlError::InvalidArgument(
                "No SAMLRequest or SAMLResponse parameter".to_string(),
            ));
        };

        // Form encoders may wrap long base64 values
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| SamlError::Base64Decode(e.to_string()))?;
        let message = utf8_message(decoded)?;
        let document = XmlDocument::parse(&message)?;

        Ok(Self {
            message,
            document,
            message_type,
            relay_state: relay_state.map(String::from),
        })
    }

    /// The decoded message XML.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The parsed message.
    #[must_use]
    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// Whether the form carried `SAMLRequest` or `SAMLResponse`.
    #[must_use]
    pub fn message_type(&self) -> SamlMessageType {
        self.message_type
    }

    /// The RelayState.
    #[must_use]
    pub fn relay_state(&self) -> Option<&str> {
        self.relay_state.as_deref()
    }

    /// Returns true if the message element is signed.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        signature::is_signed(&self.document)
    }

    /// Verifies the message signature against any of `keys`.
    #[must_use]
    pub fn check_signature(&self, keys: &[VerificationKey]) -> bool {
        signature::check_signature_with_keys(&self.document, keys)
    }

    /// Verifies the message signature with the key in its own `KeyInfo`.
    #[must_use]
    pub fn check_signature_embedded(
        &self,
        specifications: &[Arc<dyn CertificateSpecification>],
    ) -> bool {
        signature::check_signature(&self.document, specifications)
    }
}

/// Escapes HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
