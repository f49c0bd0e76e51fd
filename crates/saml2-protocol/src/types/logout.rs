//! SAML Logout types.
//!
//! Single Logout (SLO) request and response messages.

use chrono::{DateTime, Utc};

use super::{
    expect_root, format_instant, instant_attribute, protocol_root, required_attribute, samlp,
    NameId, Status, SAMLP_NS, SAML_NS, SAML_VERSION,
};
use crate::error::{SamlError, SamlResult};
use crate::xml::{Element, XmlDocument};

/// SAML Logout Request.
///
/// A request to terminate an existing session.
#[derive(Debug, Clone)]
pub struct LogoutRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the requester.
    pub issuer: String,

    /// The URL where this request was sent.
    pub destination: Option<String>,

    /// The name identifier of the principal to log out.
    pub name_id: NameId,

    /// Session indexes to terminate.
    pub session_indexes: Vec<String>,

    /// Reason for the logout.
    pub reason: Option<String>,

    /// Time after which the request is no longer valid.
    pub not_on_or_after: Option<DateTime<Utc>>,
}

impl LogoutRequest {
    /// User logout reason.
    pub const REASON_USER: &'static str = "urn:oasis:names:tc:SAML:2.0:logout:user";

    /// Admin logout reason.
    pub const REASON_ADMIN: &'static str = "urn:oasis:names:tc:SAML:2.0:logout:admin";

    /// Creates a new logout request.
    #[must_use]
    pub fn new(issuer: impl Into<String>, name_id: NameId) -> Self {
        Self {
            id: saml2_crypto::generate_message_id(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: None,
            name_id,
            session_indexes: Vec::new(),
            reason: None,
            not_on_or_after: None,
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Adds a session index.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_indexes.push(index.into());
        self
    }

    /// Sets the logout reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the expiry time.
    #[must_use]
    pub const fn with_not_on_or_after(mut self, time: DateTime<Utc>) -> Self {
        self.not_on_or_after = Some(time);
        self
    }

    /// Returns true if the request has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.not_on_or_after.is_some_and(|t| Utc::now() >= t)
    }

    /// Serializes as a `samlp:LogoutRequest` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        protocol_root("LogoutRequest")
            .attr("ID", self.id.as_str())
            .attr("Version", SAML_VERSION)
            .attr("IssueInstant", format_instant(&self.issue_instant))
            .attr_opt("Destination", self.destination.as_deref())
            .attr_opt("Reason", self.reason.as_deref())
            .attr_opt("NotOnOrAfter", self.not_on_or_after.as_ref().map(format_instant))
            .child(NameId::new(self.issuer.as_str()).to_issuer_element())
            .child(self.name_id.to_element())
            .children(
                self.session_indexes
                    .iter()
                    .map(|index| samlp("SessionIndex").text(index.as_str())),
            )
    }

    /// Serializes the request as an XML document.
    #[must_use]
    pub fn to_document(&self) -> XmlDocument {
        XmlDocument::from_root(self.to_element())
    }

    /// Serializes the request to an XML string.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.to_element().to_xml()
    }

    /// Reads a `samlp:LogoutRequest` element.
    pub fn from_element(el: &Element) -> SamlResult<Self> {
        expect_root(el, SAMLP_NS, "LogoutRequest")?;
        let name_id = el
            .find_child(SAML_NS, "NameID")
            .map(NameId::from_element)
            .ok_or_else(|| SamlError::format("LogoutRequest element must contain a NameID element"))?;
        Ok(Self {
            id: required_attribute(el, "ID")?,
            issue_instant: instant_attribute(el, "IssueInstant")?
                .ok_or_else(|| SamlError::format("LogoutRequest element must have the IssueInstant attribute set."))?,
            issuer: issuer_of(el)?,
            destination: el.attribute("Destination").map(str::to_string),
            name_id,
            session_indexes: el
                .find_children(SAMLP_NS, "SessionIndex")
                .map(|index| index.text_content().trim().to_string())
                .collect(),
            reason: el.attribute("Reason").map(str::to_string),
            not_on_or_after: instant_attribute(el, "NotOnOrAfter")?,
        })
    }
}

/// SAML Logout Response.
///
/// A response to a logout request.
#[derive(Debug, Clone)]
pub struct LogoutResponse {
    /// Unique identifier for this response.
    pub id: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the responder.
    pub issuer: String,

    /// The ID of the request this response is for.
    pub in_response_to: Option<String>,

    /// The URL where this response was sent.
    pub destination: Option<String>,

    /// The status of the logout operation.
    pub status: Status,
}

impl LogoutResponse {
    /// Creates a new successful logout response.
    #[must_use]
    pub fn success(issuer: impl Into<String>, in_response_to: impl Into<String>) -> Self {
        Self::with_status(issuer, in_response_to, Status::success())
    }

    /// Creates a logout response with the given status.
    #[must_use]
    pub fn with_status(
        issuer: impl Into<String>,
        in_response_to: impl Into<String>,
        status: Status,
    ) -> Self {
        Self {
            id: saml2_crypto::generate_message_id(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            in_response_to: Some(in_response_to.into()),
            destination: None,
            status,
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Returns true if the logout was successful.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Serializes as a `samlp:LogoutResponse` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        protocol_root("LogoutResponse")
            .attr("ID", self.id.as_str())
            .attr("Version", SAML_VERSION)
            .attr("IssueInstant", format_instant(&self.issue_instant))
            .attr_opt("Destination", self.destination.as_deref())
            .attr_opt("InResponseTo", self.in_response_to.as_deref())
            .child(NameId::new(self.issuer.as_str()).to_issuer_element())
            .child(self.status.to_element())
    }

    /// Serializes the response as an XML document.
    #[must_use]
    pub fn to_document(&self) -> XmlDocument {
        XmlDocument::from_root(self.to_element())
    }

    /// Serializes the response to an XML string.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.to_element().to_xml()
    }

    /// Reads a `samlp:LogoutResponse` element.
    pub fn from_element(el: &Element) -> SamlResult<Self> {
        expect_root(el, SAMLP_NS, "LogoutResponse")?;
        let status = el
            .find_child(SAMLP_NS, "Status")
            .ok_or_else(|| SamlError::format("LogoutResponse element must contain a Status element"))
            .and_then(Status::from_element)?;
        Ok(Self {
            id: required_attribute(el, "ID")?,
            issue_instant: instant_attribute(el, "IssueInstant")?.unwrap_or_else(Utc::now),
            issuer: issuer_of(el)?,
            in_response_to: el.attribute("InResponseTo").map(str::to_string),
            destination: el.attribute("Destination").map(str::to_string),
            status,
        })
    }
}

/// The text of the `saml:Issuer` child of a protocol message.
pub(crate) fn issuer_of(el: &Element) -> SamlResult<String> {
    el.child_text(SAML_NS, "Issuer")
        .filter(|issuer| !issuer.is_empty())
        .ok_or_else(|| SamlError::format(format!("{} element must have an issuer element.", el.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn logout_request_roundtrip() {
        let request = LogoutRequest::new(
            "https://sp.example.com",
            NameId::new("user@example.com"),
        )
        .with_destination("https://idp.example.com/slo")
        .with_session_index("session-123")
        .with_reason(LogoutRequest::REASON_USER);

        let parsed = LogoutRequest::from_element(&request.to_element()).unwrap();
        assert_eq!(parsed.id, request.id);
        assert_eq!(parsed.issuer, "https://sp.example.com");
        assert_eq!(parsed.name_id.value, "user@example.com");
        assert_eq!(parsed.session_indexes, vec!["session-123".to_string()]);
        assert_eq!(parsed.reason.as_deref(), Some(LogoutRequest::REASON_USER));
    }

    #[test]
    fn logout_request_expiry() {
        let request = LogoutRequest::new("https://sp.example.com", NameId::new("user"));
        assert!(!request.is_expired());

        let expired = request
            .clone()
            .with_not_on_or_after(Utc::now() - Duration::hours(1));
        assert!(expired.is_expired());
    }

    #[test]
    fn logout_response_roundtrip() {
        let response = LogoutResponse::success("https://idp.example.com", "req-123")
            .with_destination("https://sp.example.com/slo");

        let parsed = LogoutResponse::from_element(&response.to_element()).unwrap();
        assert!(parsed.is_success());
        assert_eq!(parsed.in_response_to.as_deref(), Some("req-123"));
        assert_eq!(parsed.issuer, "https://idp.example.com");
    }

    #[test]
    fn logout_request_without_issuer_is_rejected() {
        let el = protocol_root("LogoutRequest")
            .attr("ID", "id1234567890abcdef")
            .attr("IssueInstant", "2024-01-01T00:00:00Z")
            .child(NameId::new("user").to_element());

        let err = LogoutRequest::from_element(&el).unwrap_err();
        assert_eq!(err.to_string(), "LogoutRequest element must have an issuer element.");
    }
}
