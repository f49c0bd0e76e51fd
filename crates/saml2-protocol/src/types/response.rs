//! SAML Response types.
//!
//! Response messages sent by an identity provider to a service provider.
//! Only the inbound direction is modelled; assertions are kept as detached
//! elements so their signatures can be verified before they are parsed.

use chrono::{DateTime, Utc};

use super::{expect_root, instant_attribute, required_attribute, Status, SAMLP_NS, SAML_NS, XMLDSIG_NS};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML Response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Unique identifier for this response.
    pub id: String,

    /// Timestamp when this response was issued.
    pub issue_instant: Option<DateTime<Utc>>,

    /// The entity ID of the identity provider that issued this response.
    pub issuer: Option<String>,

    /// The ID of the request this response is for.
    pub in_response_to: Option<String>,

    /// The URL where this response was sent.
    pub destination: Option<String>,

    /// The status of the response.
    pub status: Status,

    /// The assertions in this response, detached from the response.
    pub assertions: Vec<Element>,

    /// Number of encrypted assertions in this response.
    pub encrypted_assertions: usize,

    /// Whether the response itself carries an enveloped signature.
    pub signed: bool,
}

impl Response {
    /// Reads a `samlp:Response` element.
    pub fn from_element(el: &Element) -> SamlResult<Self> {
        expect_root(el, SAMLP_NS, "Response")?;
        let status = el
            .find_child(SAMLP_NS, "Status")
            .ok_or_else(|| SamlError::format("Response element must contain a Status element"))
            .and_then(Status::from_element)?;
        let scope = el.scope(&Default::default());

        Ok(Self {
            id: required_attribute(el, "ID")?,
            issue_instant: instant_attribute(el, "IssueInstant")?,
            issuer: el.child_text(SAML_NS, "Issuer"),
            in_response_to: el.attribute("InResponseTo").map(str::to_string),
            destination: el.attribute("Destination").map(str::to_string),
            status,
            assertions: el
                .find_children(SAML_NS, "Assertion")
                .map(|assertion| assertion.detached(&scope))
                .collect(),
            encrypted_assertions: el.find_children(SAML_NS, "EncryptedAssertion").count(),
            signed: el.find_child(XMLDSIG_NS, "Signature").is_some(),
        })
    }

    /// Returns true if the response indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;

    const RESPONSE: &str = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="idresponse0000000001" Version="2.0" IssueInstant="2024-05-01T10:00:00Z" InResponseTo="idrequest" Destination="https://sp.example.com/acs">
  <saml:Issuer>https://idp.example.com</saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
  <saml:Assertion ID="idassertion000000001" Version="2.0" IssueInstant="2024-05-01T10:00:00Z">
    <saml:Issuer>https://idp.example.com</saml:Issuer>
  </saml:Assertion>
</samlp:Response>"#;

    #[test]
    fn parses_response_envelope() {
        let doc = XmlDocument::parse(RESPONSE).unwrap();
        let response = Response::from_element(doc.root()).unwrap();

        assert!(response.is_success());
        assert!(!response.signed);
        assert_eq!(response.issuer.as_deref(), Some("https://idp.example.com"));
        assert_eq!(response.in_response_to.as_deref(), Some("idrequest"));
        assert_eq!(response.assertions.len(), 1);
        assert_eq!(response.encrypted_assertions, 0);
    }

    #[test]
    fn detached_assertion_serializes_standalone() {
        let doc = XmlDocument::parse(RESPONSE).unwrap();
        let response = Response::from_element(doc.root()).unwrap();

        let xml = response.assertions[0].to_xml();
        let reparsed = XmlDocument::parse(&xml).unwrap();
        assert!(reparsed.root().is(SAML_NS, "Assertion"));
    }

    #[test]
    fn rejects_other_roots() {
        let doc = XmlDocument::parse(
            r#"<samlp:LogoutResponse xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"/>"#,
        )
        .unwrap();
        assert!(Response::from_element(doc.root()).is_err());
    }
}
