//! SAML AuthnRequest types.
//!
//! Authentication request message sent by a service provider to an identity provider.

use chrono::{DateTime, Utc};

use super::{
    format_instant, protocol_root, saml, samlp, NameId, NameIdPolicy, SamlBinding, SAML_VERSION,
};
use crate::xml::{Element, XmlDocument};

/// SAML Authentication Request.
///
/// An authentication request message sent from a service provider to an
/// identity provider requesting authentication of a principal.
#[derive(Debug, Clone)]
pub struct AuthnRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the service provider issuing the request.
    pub issuer: String,

    /// The URL where the response should be sent.
    pub assertion_consumer_service_url: Option<String>,

    /// The identity provider endpoint the request is sent to.
    pub destination: Option<String>,

    /// Binding to use for the response.
    pub protocol_binding: Option<SamlBinding>,

    /// Name ID policy constraints.
    pub name_id_policy: Option<NameIdPolicy>,

    /// Requested authentication context.
    pub requested_authn_context: Option<RequestedAuthnContext>,

    /// Whether the IdP must authenticate the user directly.
    pub force_authn: bool,

    /// Whether the IdP must not interact with the user.
    pub is_passive: bool,

    /// A human-readable name for the requester.
    pub provider_name: Option<String>,
}

impl AuthnRequest {
    /// Creates a new authentication request with a fresh identifier.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: saml2_crypto::generate_message_id(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            assertion_consumer_service_url: None,
            destination: None,
            protocol_binding: None,
            name_id_policy: None,
            requested_authn_context: None,
            force_authn: false,
            is_passive: false,
            provider_name: None,
        }
    }

    /// Sets the assertion consumer service URL.
    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the protocol binding for the response.
    #[must_use]
    pub const fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.protocol_binding = Some(binding);
        self
    }

    /// Sets the name ID policy.
    #[must_use]
    pub fn with_name_id_policy(mut self, policy: NameIdPolicy) -> Self {
        self.name_id_policy = Some(policy);
        self
    }

    /// Sets the requested authentication context.
    #[must_use]
    pub fn with_authn_context(mut self, context: RequestedAuthnContext) -> Self {
        self.requested_authn_context = Some(context);
        self
    }

    /// Sets force authentication.
    #[must_use]
    pub const fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    /// Sets passive authentication.
    #[must_use]
    pub const fn is_passive(mut self, passive: bool) -> Self {
        self.is_passive = passive;
        self
    }

    /// Serializes as a `samlp:AuthnRequest` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        let mut el = protocol_root("AuthnRequest")
            .attr("ID", self.id.as_str())
            .attr("Version", SAML_VERSION)
            .attr("IssueInstant", format_instant(&self.issue_instant))
            .attr_opt("Destination", self.destination.as_deref())
            .attr_opt("ProviderName", self.provider_name.as_deref())
            .attr_opt("ProtocolBinding", self.protocol_binding.map(|b| b.uri()))
            .attr_opt(
                "AssertionConsumerServiceURL",
                self.assertion_consumer_service_url.as_deref(),
            );
        if self.force_authn {
            el = el.attr("ForceAuthn", "true");
        }
        if self.is_passive {
            el = el.attr("IsPassive", "true");
        }
        el.child(NameId::new(self.issuer.as_str()).to_issuer_element())
            .child_opt(self.name_id_policy.as_ref().map(NameIdPolicy::to_element))
            .child_opt(
                self.requested_authn_context
                    .as_ref()
                    .map(RequestedAuthnContext::to_element),
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
}

/// Requested authentication context.
///
/// Specifies the authentication context requirements for the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestedAuthnContext {
    /// Comparison method for the authentication context.
    pub comparison: AuthnContextComparison,

    /// List of acceptable authentication context class references.
    pub class_refs: Vec<String>,
}

impl RequestedAuthnContext {
    /// Creates a context requiring an exact match of one class reference.
    #[must_use]
    pub fn exact(class_ref: impl Into<String>) -> Self {
        Self {
            comparison: AuthnContextComparison::Exact,
            class_refs: vec![class_ref.into()],
        }
    }

    /// Sets the comparison method.
    #[must_use]
    pub const fn with_comparison(mut self, comparison: AuthnContextComparison) -> Self {
        self.comparison = comparison;
        self
    }

    fn to_element(&self) -> Element {
        samlp("RequestedAuthnContext")
            .attr("Comparison", self.comparison.as_str())
            .children(
                self.class_refs
                    .iter()
                    .map(|class_ref| saml("AuthnContextClassRef").text(class_ref.as_str())),
            )
    }
}

/// Authentication context comparison methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthnContextComparison {
    /// Exact match required.
    #[default]
    Exact,
    /// Match must be at least as strong.
    Minimum,
    /// Match must be at most as strong.
    Maximum,
    /// Match must be stronger than any listed context.
    Better,
}

impl AuthnContextComparison {
    /// Returns the string value for this comparison.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::Better => "better",
        }
    }
}
