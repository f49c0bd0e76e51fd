//! SAML Name ID types.
//!
//! Name identifiers are used to identify subjects in SAML assertions and,
//! through the same schema type, the issuers of messages.

use serde::{Deserialize, Serialize};

use super::{saml, samlp, NameIdFormat};
use crate::xml::Element;

/// SAML Name ID.
///
/// Represents the identifier of a subject in a SAML assertion, or the
/// issuer of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The actual identifier value.
    pub value: String,

    /// The format of the name identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The security or administrative domain that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,

    /// The service provider's entity ID that qualifies the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,

    /// A provider identifier for the SP that was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_provided_id: Option<String>,
}

impl NameId {
    /// Creates a new name ID with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Creates an entity name ID, the form used for issuers.
    #[must_use]
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self::new(entity_id).with_format(NameIdFormat::Entity)
    }

    /// Sets the format for this name ID.
    #[must_use]
    pub fn with_format(mut self, format: NameIdFormat) -> Self {
        self.format = Some(format.uri().to_string());
        self
    }

    /// Sets the format URI for this name ID.
    #[must_use]
    pub fn with_format_uri(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Sets the name qualifier.
    #[must_use]
    pub fn with_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.name_qualifier = Some(qualifier.into());
        self
    }

    /// Sets the SP name qualifier.
    #[must_use]
    pub fn with_sp_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.sp_name_qualifier = Some(qualifier.into());
        self
    }

    /// Returns the parsed name ID format.
    #[must_use]
    pub fn parsed_format(&self) -> NameIdFormat {
        self.format
            .as_deref()
            .and_then(NameIdFormat::from_uri)
            .unwrap_or_default()
    }

    /// Serializes as a `saml:NameID`.
    #[must_use]
    pub fn to_element(&self) -> Element {
        self.to_named_element("NameID")
    }

    /// Serializes as a `saml:Issuer`.
    #[must_use]
    pub fn to_issuer_element(&self) -> Element {
        self.to_named_element("Issuer")
    }

    fn to_named_element(&self, local: &str) -> Element {
        saml(local)
            .attr_opt("NameQualifier", self.name_qualifier.as_deref())
            .attr_opt("SPNameQualifier", self.sp_name_qualifier.as_deref())
            .attr_opt("Format", self.format.as_deref())
            .attr_opt("SPProvidedID", self.sp_provided_id.as_deref())
            .text(self.value.as_str())
    }

    /// Reads any element of `NameIDType`.
    #[must_use]
    pub fn from_element(el: &Element) -> Self {
        Self {
            value: el.text_content().trim().to_string(),
            format: el.attribute("Format").map(str::to_string),
            name_qualifier: el.attribute("NameQualifier").map(str::to_string),
            sp_name_qualifier: el.attribute("SPNameQualifier").map(str::to_string),
            sp_provided_id: el.attribute("SPProvidedID").map(str::to_string),
        }
    }
}

/// Name ID policy for authentication requests.
///
/// Specifies constraints on the name identifier to be returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIdPolicy {
    /// The requested name ID format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// The SP name qualifier for the name ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,

    /// Whether the identity provider may create a new identifier. Passed
    /// through from configuration as-is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_create: Option<bool>,
}

impl NameIdPolicy {
    /// Creates a policy requesting a specific format.
    #[must_use]
    pub fn with_format(format: NameIdFormat) -> Self {
        Self {
            format: Some(format.uri().to_string()),
            ..Self::default()
        }
    }

    /// Sets whether new identifiers can be created.
    #[must_use]
    pub const fn allow_create(mut self, allow: bool) -> Self {
        self.allow_create = Some(allow);
        self
    }

    /// Returns the parsed name ID format.
    #[must_use]
    pub fn parsed_format(&self) -> Option<NameIdFormat> {
        self.format.as_deref().and_then(NameIdFormat::from_uri)
    }

    /// Serializes as a `samlp:NameIDPolicy`.
    #[must_use]
    pub fn to_element(&self) -> Element {
        samlp("NameIDPolicy")
            .attr_opt("Format", self.format.as_deref())
            .attr_opt("SPNameQualifier", self.sp_name_qualifier.as_deref())
            .attr_opt(
                "AllowCreate",
                self.allow_create.map(|allow| allow.to_string()),
            )
    }
}
