//! SAML `AttributeQuery` request.

use chrono::{DateTime, Utc};

use super::{format_instant, protocol_root, saml, NameId, SamlAttribute, SAML_VERSION};
use crate::xml::{Element, XmlDocument};

/// A query for attributes of a subject, sent to an attribute authority.
#[derive(Debug, Clone)]
pub struct AttributeQuery {
    /// Unique identifier for this request.
    pub id: String,
    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,
    /// The entity ID of the requester.
    pub issuer: String,
    /// The attribute service endpoint.
    pub destination: Option<String>,
    /// The subject whose attributes are requested.
    pub subject: NameId,
    /// Attributes requested. Empty means all releasable attributes.
    pub attributes: Vec<SamlAttribute>,
}

impl AttributeQuery {
    /// Creates a query for the given subject.
    #[must_use]
    pub fn new(issuer: impl Into<String>, subject: NameId) -> Self {
        Self {
            id: saml2_crypto::generate_message_id(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: None,
            subject,
            attributes: Vec::new(),
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Requests a specific attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: SamlAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Serializes as a `samlp:AttributeQuery` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        protocol_root("AttributeQuery")
            .attr("ID", self.id.as_str())
            .attr("Version", SAML_VERSION)
            .attr("IssueInstant", format_instant(&self.issue_instant))
            .attr_opt("Destination", self.destination.as_deref())
            .child(NameId::new(self.issuer.as_str()).to_issuer_element())
            .child(saml("Subject").child(self.subject.to_element()))
            .children(self.attributes.iter().map(SamlAttribute::to_element))
    }

    /// Serializes the query as an XML document.
    #[must_use]
    pub fn to_document(&self) -> XmlDocument {
        XmlDocument::from_root(self.to_element())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{attribute_name_formats, SAMLP_NS, SAML_NS};

    #[test]
    fn attribute_query_element() {
        let query = AttributeQuery::new("https://sp.example.com", NameId::new("user-1"))
            .with_destination("https://idp.example.com/attributes")
            .with_attribute(
                SamlAttribute::new("urn:oid:2.5.4.42")
                    .with_name_format(attribute_name_formats::URI),
            );
        let el = query.to_element();

        assert!(el.is(SAMLP_NS, "AttributeQuery"));
        let subject = el.find_child(SAML_NS, "Subject").unwrap();
        assert_eq!(subject.child_text(SAML_NS, "NameID").as_deref(), Some("user-1"));
        let attribute = el.find_child(SAML_NS, "Attribute").unwrap();
        assert_eq!(attribute.attribute("Name"), Some("urn:oid:2.5.4.42"));
        assert!(attribute.find_child(SAML_NS, "AttributeValue").is_none());
    }
}
