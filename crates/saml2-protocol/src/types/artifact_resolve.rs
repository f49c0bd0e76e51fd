//! Artifact resolution protocol messages.
//!
//! `ArtifactResolve` asks the issuer of an artifact for the message it
//! stands for; `ArtifactResponse` carries that message back.

use chrono::{DateTime, Utc};

use super::logout::issuer_of;
use super::{
    expect_root, format_instant, instant_attribute, protocol_root, required_attribute, samlp,
    NameId, Status, SAMLP_NS, SAML_NS, SAML_VERSION, XMLDSIG_NS,
};
use crate::error::{SamlError, SamlResult};
use crate::xml::{Element, XmlDocument};

/// SAML `ArtifactResolve` request.
#[derive(Debug, Clone)]
pub struct ArtifactResolve {
    /// Unique identifier for this request.
    pub id: String,
    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,
    /// The entity ID of the requester.
    pub issuer: String,
    /// The artifact resolution endpoint.
    pub destination: Option<String>,
    /// The artifact to resolve, in transport form.
    pub artifact: String,
}

impl ArtifactResolve {
    /// Creates a request for the given artifact.
    #[must_use]
    pub fn new(issuer: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            id: saml2_crypto::generate_message_id(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: None,
            artifact: artifact.into(),
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Serializes as a `samlp:ArtifactResolve` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        protocol_root("ArtifactResolve")
            .attr("ID", self.id.as_str())
            .attr("Version", SAML_VERSION)
            .attr("IssueInstant", format_instant(&self.issue_instant))
            .attr_opt("Destination", self.destination.as_deref())
            .child(NameId::new(self.issuer.as_str()).to_issuer_element())
            .child(samlp("Artifact").text(self.artifact.as_str()))
    }

    /// Serializes the request as an XML document.
    #[must_use]
    pub fn to_document(&self) -> XmlDocument {
        XmlDocument::from_root(self.to_element())
    }

    /// Reads a `samlp:ArtifactResolve` element.
    pub fn from_element(el: &Element) -> SamlResult<Self> {
        expect_root(el, SAMLP_NS, "ArtifactResolve")?;
        let artifact = el
            .child_text(SAMLP_NS, "Artifact")
            .filter(|artifact| !artifact.is_empty())
            .ok_or_else(|| SamlError::format("ArtifactResolve element must contain an Artifact element"))?;
        Ok(Self {
            id: required_attribute(el, "ID")?,
            issue_instant: instant_attribute(el, "IssueInstant")?.unwrap_or_else(Utc::now),
            issuer: issuer_of(el)?,
            destination: el.attribute("Destination").map(str::to_string),
            artifact,
        })
    }
}

/// SAML `ArtifactResponse`.
#[derive(Debug, Clone)]
pub struct ArtifactResponse {
    /// Unique identifier for this response.
    pub id: String,
    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,
    /// The entity ID of the responder.
    pub issuer: String,
    /// The ID of the `ArtifactResolve` being answered.
    pub in_response_to: Option<String>,
    /// Status of the resolution.
    pub status: Status,
    /// The resolved protocol message, absent when the artifact was unknown.
    pub message: Option<Element>,
}

impl ArtifactResponse {
    /// Creates a successful response carrying a resolved message.
    #[must_use]
    pub fn success(
        issuer: impl Into<String>,
        in_response_to: impl Into<String>,
        message: Option<Element>,
    ) -> Self {
        Self {
            id: saml2_crypto::generate_message_id(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            in_response_to: Some(in_response_to.into()),
            status: Status::success(),
            message,
        }
    }

    /// Serializes as a `samlp:ArtifactResponse` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        protocol_root("ArtifactResponse")
            .attr("ID", self.id.as_str())
            .attr("Version", SAML_VERSION)
            .attr("IssueInstant", format_instant(&self.issue_instant))
            .attr_opt("InResponseTo", self.in_response_to.as_deref())
            .child(NameId::new(self.issuer.as_str()).to_issuer_element())
            .child(self.status.to_element())
            .child_opt(self.message.clone())
    }

    /// Serializes the response as an XML document.
    #[must_use]
    pub fn to_document(&self) -> XmlDocument {
        XmlDocument::from_root(self.to_element())
    }

    /// Reads a `samlp:ArtifactResponse` element. The embedded message is
    /// detached so it can be serialized and verified on its own.
    pub fn from_element(el: &Element) -> SamlResult<Self> {
        expect_root(el, SAMLP_NS, "ArtifactResponse")?;
        let status = el
            .find_child(SAMLP_NS, "Status")
            .ok_or_else(|| SamlError::format("ArtifactResponse element must contain a Status element"))
            .and_then(Status::from_element)?;
        let scope = el.scope(&Default::default());
        let message = el
            .child_elements()
            .find(|child| {
                !child.is(SAML_NS, "Issuer")
                    && !child.is(XMLDSIG_NS, "Signature")
                    && !child.is(SAMLP_NS, "Status")
                    && !child.is(SAMLP_NS, "Extensions")
            })
            .map(|child| child.detached(&scope));
        Ok(Self {
            id: required_attribute(el, "ID")?,
            issue_instant: instant_attribute(el, "IssueInstant")?.unwrap_or_else(Utc::now),
            issuer: issuer_of(el)?,
            in_response_to: el.attribute("InResponseTo").map(str::to_string),
            status,
            message,
        })
    }
}
