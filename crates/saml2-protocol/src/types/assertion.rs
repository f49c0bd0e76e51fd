//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer. The
//! model here is the parsed, inbound form: optional schema content stays
//! optional so the validators can report what is missing, and the abstract
//! schema types (statements, conditions, identifiers, key info clauses) are
//! sum types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    expect_root, instant_attribute, prefixes, saml, NameId, KEY_INFO_CONFIRMATION_DATA_TYPE,
    SAML_NS, XMLDSIG_NS, XMLENC_NS, XSI_NS,
};
use crate::error::SamlResult;
use crate::xml::{Element, XmlAttribute};

/// SAML Assertion.
///
/// A package of information that supplies zero or more statements made
/// by a SAML authority (the issuer).
#[derive(Debug, Clone, Default)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: Option<String>,

    /// Version of the SAML protocol.
    pub version: Option<String>,

    /// Timestamp when this assertion was issued.
    pub issue_instant: Option<DateTime<Utc>>,

    /// The issuer of this assertion.
    pub issuer: Option<NameId>,

    /// Whether the assertion carries an enveloped signature.
    pub signed: bool,

    /// The subject of this assertion.
    pub subject: Option<Subject>,

    /// Conditions that must be evaluated for the assertion to be valid.
    pub conditions: Option<Conditions>,

    /// Statements, in document order.
    pub statements: Vec<Statement>,
}

impl Assertion {
    /// Reads a `saml:Assertion` element.
    pub fn from_element(el: &Element) -> SamlResult<Self> {
        expect_root(el, SAML_NS, "Assertion")?;
        let mut statements = Vec::new();
        for child in el.child_elements() {
            if child.namespace.as_deref() != Some(SAML_NS) {
                continue;
            }
            let statement = match child.name.as_str() {
                "AuthnStatement" => Statement::Authn(AuthnStatement::from_element(child)?),
                "AuthzDecisionStatement" => {
                    Statement::AuthzDecision(AuthzDecisionStatement::from_element(child))
                }
                "AttributeStatement" => {
                    Statement::Attribute(AttributeStatement::from_element(child))
                }
                "Statement" => Statement::Unknown(
                    xsi_type(child).unwrap_or("Statement").to_string(),
                ),
                _ => continue,
            };
            statements.push(statement);
        }

        Ok(Self {
            id: el.attribute("ID").map(str::to_string),
            version: el.attribute("Version").map(str::to_string),
            issue_instant: instant_attribute(el, "IssueInstant")?,
            issuer: el.find_child(SAML_NS, "Issuer").map(NameId::from_element),
            signed: el.find_child(XMLDSIG_NS, "Signature").is_some(),
            subject: el
                .find_child(SAML_NS, "Subject")
                .map(Subject::from_element)
                .transpose()?,
            conditions: el
                .find_child(SAML_NS, "Conditions")
                .map(Conditions::from_element)
                .transpose()?,
            statements,
        })
    }

    /// The subject's NameID, if the subject is identified by one.
    #[must_use]
    pub fn name_id(&self) -> Option<&NameId> {
        match self.subject.as_ref()?.identifier.as_ref()? {
            SubjectIdentifier::NameId(name_id) => Some(name_id),
            _ => None,
        }
    }

    /// Authentication statements.
    pub fn authn_statements(&self) -> impl Iterator<Item = &AuthnStatement> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Authn(authn) => Some(authn),
            _ => None,
        })
    }

    /// Session index from the first authentication statement carrying one.
    #[must_use]
    pub fn session_index(&self) -> Option<&str> {
        self.authn_statements()
            .find_map(|statement| statement.session_index.as_deref())
    }

    /// Plain-text attributes across all attribute statements.
    pub fn attributes(&self) -> impl Iterator<Item = &SamlAttribute> {
        self.statements
            .iter()
            .filter_map(|statement| match statement {
                Statement::Attribute(attributes) => Some(attributes),
                _ => None,
            })
            .flat_map(|statement| statement.items.iter())
            .filter_map(|item| match item {
                AttributeStatementItem::Attribute(attribute) => Some(attribute),
                AttributeStatementItem::EncryptedAttribute(_) => None,
            })
    }
}

/// The subject of an assertion.
#[derive(Debug, Clone, Default)]
pub struct Subject {
    /// How the subject is identified.
    pub identifier: Option<SubjectIdentifier>,
    /// Subject confirmations.
    pub confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    fn from_element(el: &Element) -> SamlResult<Self> {
        Ok(Self {
            identifier: SubjectIdentifier::find_in(el),
            confirmations: el
                .find_children(SAML_NS, "SubjectConfirmation")
                .map(SubjectConfirmation::from_element)
                .collect::<SamlResult<_>>()?,
        })
    }
}

/// The identifier of a subject.
#[derive(Debug, Clone)]
pub enum SubjectIdentifier {
    /// A plain name identifier.
    NameId(NameId),
    /// An encrypted name identifier.
    EncryptedId(EncryptedElement),
    /// An extension identifier.
    BaseId(BaseId),
}

impl SubjectIdentifier {
    fn find_in(el: &Element) -> Option<Self> {
        el.child_elements().find_map(|child| {
            if child.is(SAML_NS, "NameID") {
                Some(Self::NameId(NameId::from_element(child)))
            } else if child.is(SAML_NS, "EncryptedID") {
                Some(Self::EncryptedId(EncryptedElement::from_element(child)))
            } else if child.is(SAML_NS, "BaseID") {
                Some(Self::BaseId(BaseId {
                    name_qualifier: child.attribute("NameQualifier").map(str::to_string),
                    sp_name_qualifier: child.attribute("SPNameQualifier").map(str::to_string),
                    type_name: xsi_type(child).map(str::to_string),
                }))
            } else {
                None
            }
        })
    }
}

/// An extension identifier (`saml:BaseID`).
#[derive(Debug, Clone, Default)]
pub struct BaseId {
    /// Name qualifier.
    pub name_qualifier: Option<String>,
    /// SP name qualifier.
    pub sp_name_qualifier: Option<String>,
    /// The concrete `xsi:type`.
    pub type_name: Option<String>,
}

/// SAML Subject Confirmation.
#[derive(Debug, Clone, Default)]
pub struct SubjectConfirmation {
    /// The confirmation method URI.
    pub method: Option<String>,
    /// An identifier of the confirming entity.
    pub identifier: Option<SubjectIdentifier>,
    /// Confirmation data.
    pub data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    fn from_element(el: &Element) -> SamlResult<Self> {
        Ok(Self {
            method: el.attribute("Method").map(str::to_string),
            identifier: SubjectIdentifier::find_in(el),
            data: el
                .find_child(SAML_NS, "SubjectConfirmationData")
                .map(SubjectConfirmationData::from_element)
                .transpose()?,
        })
    }
}

/// SAML Subject Confirmation Data.
#[derive(Debug, Clone, Default)]
pub struct SubjectConfirmationData {
    /// Time before which the subject cannot be confirmed.
    pub not_before: Option<DateTime<Utc>>,
    /// Time at which the subject can no longer be confirmed.
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// The URL the assertion may be presented to.
    pub recipient: Option<String>,
    /// The ID of the request the assertion answers.
    pub in_response_to: Option<String>,
    /// Network address of the attesting entity.
    pub address: Option<String>,
    /// Whether the data is declared as `KeyInfoConfirmationDataType`.
    pub is_key_info_type: bool,
    /// `ds:KeyInfo` children.
    pub key_infos: Vec<KeyInfo>,
    /// Extension attributes.
    pub any_attributes: Vec<XmlAttribute>,
}

impl SubjectConfirmationData {
    const KNOWN_ATTRIBUTES: [&'static str; 5] =
        ["NotBefore", "NotOnOrAfter", "Recipient", "InResponseTo", "Address"];

    fn from_element(el: &Element) -> SamlResult<Self> {
        Ok(Self {
            not_before: instant_attribute(el, "NotBefore")?,
            not_on_or_after: instant_attribute(el, "NotOnOrAfter")?,
            recipient: el.attribute("Recipient").map(str::to_string),
            in_response_to: el.attribute("InResponseTo").map(str::to_string),
            address: el.attribute("Address").map(str::to_string),
            is_key_info_type: xsi_type(el) == Some(KEY_INFO_CONFIRMATION_DATA_TYPE),
            key_infos: el
                .find_children(XMLDSIG_NS, "KeyInfo")
                .map(KeyInfo::from_element)
                .collect(),
            any_attributes: extension_attributes(el, &Self::KNOWN_ATTRIBUTES),
        })
    }
}

/// A `ds:KeyInfo` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyInfo {
    /// Key info clauses in document order.
    pub clauses: Vec<KeyInfoClause>,
}

impl KeyInfo {
    /// Reads a `ds:KeyInfo` element.
    #[must_use]
    pub fn from_element(el: &Element) -> Self {
        let clauses = el
            .child_elements()
            .map(|child| {
                if child.is(XMLDSIG_NS, "X509Data") {
                    KeyInfoClause::X509Data(
                        child
                            .find_children(XMLDSIG_NS, "X509Certificate")
                            .map(|cert| strip_whitespace(&cert.text_content()))
                            .collect(),
                    )
                } else if child.is(XMLDSIG_NS, "KeyValue") {
                    match child.find_child(XMLDSIG_NS, "RSAKeyValue") {
                        Some(rsa) => KeyInfoClause::RsaKeyValue {
                            modulus: strip_whitespace(
                                &rsa.child_text(XMLDSIG_NS, "Modulus").unwrap_or_default(),
                            ),
                            exponent: strip_whitespace(
                                &rsa.child_text(XMLDSIG_NS, "Exponent").unwrap_or_default(),
                            ),
                        },
                        None => KeyInfoClause::Unknown("KeyValue".to_string()),
                    }
                } else if child.is(XMLDSIG_NS, "KeyName") {
                    KeyInfoClause::KeyName(child.text_content().trim().to_string())
                } else {
                    KeyInfoClause::Unknown(child.name.clone())
                }
            })
            .collect();
        Self { clauses }
    }

    /// Returns true if the key info has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// A clause of a `ds:KeyInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInfoClause {
    /// Base64 DER certificates from `ds:X509Data`.
    X509Data(Vec<String>),
    /// An RSA public key given by its base64 components.
    RsaKeyValue {
        /// Base64 modulus.
        modulus: String,
        /// Base64 public exponent.
        exponent: String,
    },
    /// A key name.
    KeyName(String),
    /// Any other clause, by element name.
    Unknown(String),
}

/// SAML Conditions.
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    /// Time before which the assertion is not valid.
    pub not_before: Option<DateTime<Utc>>,
    /// Time at which the assertion expires.
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Conditions in document order.
    pub items: Vec<Condition>,
}

impl Conditions {
    fn from_element(el: &Element) -> SamlResult<Self> {
        let items = el
            .child_elements()
            .filter(|child| child.namespace.as_deref() == Some(SAML_NS))
            .map(|child| match child.name.as_str() {
                "AudienceRestriction" => Condition::AudienceRestriction(audiences(child)),
                "OneTimeUse" => Condition::OneTimeUse,
                "ProxyRestriction" => Condition::ProxyRestriction {
                    count: child.attribute("Count").map(str::to_string),
                    audiences: audiences(child),
                },
                _ => Condition::Unknown(xsi_type(child).unwrap_or(&child.name).to_string()),
            })
            .collect();
        Ok(Self {
            not_before: instant_attribute(el, "NotBefore")?,
            not_on_or_after: instant_attribute(el, "NotOnOrAfter")?,
            items,
        })
    }
}

fn audiences(el: &Element) -> Vec<String> {
    el.find_children(SAML_NS, "Audience")
        .map(|audience| audience.text_content().trim().to_string())
        .collect()
}

/// A condition on the validity of an assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The assertion is addressed to one of these audiences.
    AudienceRestriction(Vec<String>),
    /// The assertion may be used once.
    OneTimeUse,
    /// Limits on issuing new assertions based on this one.
    ProxyRestriction {
        /// Maximum number of proxy indirections, as written.
        count: Option<String>,
        /// Audiences allowed to receive derived assertions.
        audiences: Vec<String>,
    },
    /// Any other condition, by type name.
    Unknown(String),
}

/// A statement of an assertion.
#[derive(Debug, Clone)]
pub enum Statement {
    /// An authentication statement.
    Authn(AuthnStatement),
    /// An authorization decision statement.
    AuthzDecision(AuthzDecisionStatement),
    /// An attribute statement.
    Attribute(AttributeStatement),
    /// An extension statement, by type name.
    Unknown(String),
}

/// SAML Authentication Statement.
#[derive(Debug, Clone, Default)]
pub struct AuthnStatement {
    /// When the authentication occurred.
    pub authn_instant: Option<DateTime<Utc>>,
    /// Session index at the identity provider.
    pub session_index: Option<String>,
    /// When the session at the identity provider ends.
    pub session_not_on_or_after: Option<DateTime<Utc>>,
    /// Where the subject authenticated from.
    pub subject_locality: Option<SubjectLocality>,
    /// How the subject authenticated.
    pub authn_context: Option<AuthnContext>,
}

impl AuthnStatement {
    fn from_element(el: &Element) -> SamlResult<Self> {
        Ok(Self {
            authn_instant: instant_attribute(el, "AuthnInstant")?,
            session_index: el.attribute("SessionIndex").map(str::to_string),
            session_not_on_or_after: instant_attribute(el, "SessionNotOnOrAfter")?,
            subject_locality: el
                .find_child(SAML_NS, "SubjectLocality")
                .map(|locality| SubjectLocality {
                    address: locality.attribute("Address").map(str::to_string),
                    dns_name: locality.attribute("DNSName").map(str::to_string),
                }),
            authn_context: el
                .find_child(SAML_NS, "AuthnContext")
                .map(AuthnContext::from_element),
        })
    }
}

/// Subject locality.
#[derive(Debug, Clone, Default)]
pub struct SubjectLocality {
    /// Network address.
    pub address: Option<String>,
    /// DNS name.
    pub dns_name: Option<String>,
}

/// Authentication context of an authentication statement.
#[derive(Debug, Clone, Default)]
pub struct AuthnContext {
    /// Class references, declaration references and declarations, in
    /// document order.
    pub items: Vec<AuthnContextItem>,
    /// Authorities involved in the authentication.
    pub authenticating_authorities: Vec<String>,
}

impl AuthnContext {
    fn from_element(el: &Element) -> Self {
        let mut context = Self::default();
        for child in el.child_elements() {
            if child.namespace.as_deref() != Some(SAML_NS) {
                continue;
            }
            let text = || child.text_content().trim().to_string();
            match child.name.as_str() {
                "AuthnContextClassRef" => context.items.push(AuthnContextItem::ClassRef(text())),
                "AuthnContextDeclRef" => context.items.push(AuthnContextItem::DeclRef(text())),
                "AuthnContextDecl" => context.items.push(AuthnContextItem::Decl),
                "AuthenticatingAuthority" => context.authenticating_authorities.push(text()),
                _ => {}
            }
        }
        context
    }
}

/// An item of an authentication context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthnContextItem {
    /// `AuthnContextClassRef`.
    ClassRef(String),
    /// `AuthnContextDeclRef`.
    DeclRef(String),
    /// An inline `AuthnContextDecl`.
    Decl,
}

/// SAML Authorization Decision Statement.
#[derive(Debug, Clone, Default)]
pub struct AuthzDecisionStatement {
    /// The resource the decision applies to. Empty is allowed.
    pub resource: Option<String>,
    /// The decision (`Permit`, `Deny` or `Indeterminate`).
    pub decision: Option<String>,
    /// Actions the decision covers.
    pub actions: Vec<AuthzAction>,
}

impl AuthzDecisionStatement {
    fn from_element(el: &Element) -> Self {
        Self {
            resource: el.attribute("Resource").map(str::to_string),
            decision: el.attribute("Decision").map(str::to_string),
            actions: el
                .find_children(SAML_NS, "Action")
                .map(|action| AuthzAction {
                    namespace: action.attribute("Namespace").map(str::to_string),
                    value: action.text_content().trim().to_string(),
                })
                .collect(),
        }
    }
}

/// An action of an authorization decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthzAction {
    /// The namespace of the action value.
    pub namespace: Option<String>,
    /// The action.
    pub value: String,
}

/// SAML Attribute Statement.
#[derive(Debug, Clone, Default)]
pub struct AttributeStatement {
    /// Attributes and encrypted attributes, in document order.
    pub items: Vec<AttributeStatementItem>,
}

impl AttributeStatement {
    fn from_element(el: &Element) -> Self {
        let items = el
            .child_elements()
            .filter_map(|child| {
                if child.is(SAML_NS, "Attribute") {
                    Some(AttributeStatementItem::Attribute(SamlAttribute::from_element(child)))
                } else if child.is(SAML_NS, "EncryptedAttribute") {
                    Some(AttributeStatementItem::EncryptedAttribute(
                        EncryptedElement::from_element(child),
                    ))
                } else {
                    None
                }
            })
            .collect();
        Self { items }
    }
}

/// An item of an attribute statement.
#[derive(Debug, Clone)]
pub enum AttributeStatementItem {
    /// A plain attribute.
    Attribute(SamlAttribute),
    /// An encrypted attribute.
    EncryptedAttribute(EncryptedElement),
}

/// SAML Attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlAttribute {
    /// The attribute name.
    pub name: String,

    /// The format of the attribute name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,

    /// A human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// Values; `None` stands for an `xsi:nil` value.
    #[serde(default)]
    pub values: Vec<Option<String>>,

    /// Extension attributes.
    #[serde(skip)]
    pub any_attributes: Vec<XmlAttribute>,
}

impl SamlAttribute {
    const KNOWN_ATTRIBUTES: [&'static str; 3] = ["Name", "NameFormat", "FriendlyName"];

    /// Creates an attribute with no values.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the name format.
    #[must_use]
    pub fn with_name_format(mut self, format: impl Into<String>) -> Self {
        self.name_format = Some(format.into());
        self
    }

    /// Sets the friendly name.
    #[must_use]
    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    /// Adds a value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.values.push(Some(value.into()));
        self
    }

    /// Non-nil values.
    pub fn string_values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().filter_map(Option::as_deref)
    }

    /// Serializes as a `saml:Attribute`.
    #[must_use]
    pub fn to_element(&self) -> Element {
        saml("Attribute")
            .attr("Name", self.name.as_str())
            .attr_opt("NameFormat", self.name_format.as_deref())
            .attr_opt("FriendlyName", self.friendly_name.as_deref())
            .children(self.values.iter().map(|value| match value {
                Some(value) => saml("AttributeValue").text(value.as_str()),
                None => saml("AttributeValue")
                    .declare(prefixes::XSI, XSI_NS)
                    .attr_ns("xsi:nil", XSI_NS, "true"),
            }))
    }

    /// Reads a `saml:Attribute`.
    #[must_use]
    pub fn from_element(el: &Element) -> Self {
        Self {
            name: el.attribute("Name").unwrap_or_default().to_string(),
            name_format: el.attribute("NameFormat").map(str::to_string),
            friendly_name: el.attribute("FriendlyName").map(str::to_string),
            values: el
                .find_children(SAML_NS, "AttributeValue")
                .map(|value| {
                    let nil = value
                        .attribute_ns(XSI_NS, "nil")
                        .is_some_and(|nil| matches!(nil.trim(), "true" | "1"));
                    (!nil).then(|| value.text_content())
                })
                .collect(),
            any_attributes: extension_attributes(el, &Self::KNOWN_ATTRIBUTES),
        }
    }
}

/// An encrypted element (`EncryptedID`, `EncryptedAttribute`,
/// `EncryptedAssertion`).
#[derive(Debug, Clone, Default)]
pub struct EncryptedElement {
    /// The `xenc:EncryptedData` child.
    pub encrypted_data: Option<EncryptedData>,
    /// Number of `xenc:EncryptedKey` children.
    pub encrypted_keys: usize,
}

impl EncryptedElement {
    /// Reads any element of `EncryptedElementType`.
    #[must_use]
    pub fn from_element(el: &Element) -> Self {
        Self {
            encrypted_data: el
                .find_child(XMLENC_NS, "EncryptedData")
                .map(|data| EncryptedData {
                    type_uri: data.attribute("Type").map(str::to_string),
                }),
            encrypted_keys: el.find_children(XMLENC_NS, "EncryptedKey").count(),
        }
    }
}

/// The `xenc:EncryptedData` of an encrypted element.
#[derive(Debug, Clone, Default)]
pub struct EncryptedData {
    /// The `Type` attribute.
    pub type_uri: Option<String>,
}

/// Local part of the `xsi:type` of an element.
fn xsi_type(el: &Element) -> Option<&str> {
    el.attribute_ns(XSI_NS, "type")
        .map(|value| value.rsplit(':').next().unwrap_or(value))
}

/// Attributes outside the schema: namespaced ones other than `xsi:` and
/// unqualified ones the schema does not define.
fn extension_attributes(el: &Element, known: &[&str]) -> Vec<XmlAttribute> {
    el.attributes
        .iter()
        .filter(|attr| match attr.namespace.as_deref() {
            Some(ns) => ns != XSI_NS,
            None => !known.contains(&attr.name.as_str()),
        })
        .cloned()
        .collect()
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}
