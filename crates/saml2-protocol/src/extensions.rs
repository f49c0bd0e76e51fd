//! Registry for pluggable extensions.
//!
//! Configuration names extensions by stable string identifiers: a custom
//! assertion check or pseudonym mapper per identity provider, a token
//! accessor per endpoint and the certificate specifications applied to
//! signing certificates. The registry resolves those identifiers into trait
//! objects once, at configuration load.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{SamlError, SamlResult};
use crate::signature::{CertificateSpecification, ValidityPeriodSpecification};
use crate::types::{Assertion, NameId};
use crate::xml::Element;

/// Identifier of the built-in certificate validity period check.
pub const VALIDITY_PERIOD: &str = "validity_period";

/// Additional validation applied to an assertion after the standard rules.
pub trait AssertionCheck: Send + Sync {
    /// Returns an error to reject the assertion.
    fn check(&self, assertion: &Assertion, element: &Element) -> SamlResult<()>;
}

/// Maps the NameID an identity provider released to a local identity.
pub trait PseudonymMapper: Send + Sync {
    /// Returns the local name for `name_id`.
    fn map_identity(&self, name_id: &NameId) -> String;
}

/// Receives the raw assertion element after a successful login.
pub trait TokenAccessor: Send + Sync {
    /// Called once per accepted assertion.
    fn read_token(&self, assertion: &Element);
}

/// A resolved extension together with the identifier it was configured by.
pub struct Extension<T: ?Sized> {
    id: String,
    value: Arc<T>,
}

impl<T: ?Sized> Extension<T> {
    /// Wraps an extension instance.
    pub fn new(id: impl Into<String>, value: Arc<T>) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }

    /// The configured identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// A shared handle to the instance.
    #[must_use]
    pub fn shared(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }
}

impl<T: ?Sized> Clone for Extension<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: ?Sized> Deref for Extension<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: ?Sized> fmt::Debug for Extension<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Extension").field(&self.id).finish()
    }
}

struct Slot<T: ?Sized> {
    kind: &'static str,
    entries: DashMap<String, Arc<T>>,
}

impl<T: ?Sized> Slot<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
        }
    }

    fn register(&self, id: &str, value: Arc<T>) {
        if self.entries.insert(id.to_string(), value).is_some() {
            tracing::warn!(kind = self.kind, id, "replaced registered extension");
        }
    }

    fn resolve(&self, id: &str) -> SamlResult<Extension<T>> {
        self.entries
            .get(id)
            .map(|entry| Extension::new(id, Arc::clone(entry.value())))
            .ok_or_else(|| {
                SamlError::Configuration(format!("no {} registered as '{id}'", self.kind))
            })
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

/// Registry of extensions keyed by identifier.
pub struct ExtensionRegistry {
    assertion_checks: Slot<dyn AssertionCheck>,
    pseudonym_mappers: Slot<dyn PseudonymMapper>,
    token_accessors: Slot<dyn TokenAccessor>,
    certificate_specifications: Slot<dyn CertificateSpecification>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("assertion_checks", &self.assertion_checks.ids())
            .field("pseudonym_mappers", &self.pseudonym_mappers.ids())
            .field("token_accessors", &self.token_accessors.ids())
            .field(
                "certificate_specifications",
                &self.certificate_specifications.ids(),
            )
            .finish()
    }
}

impl ExtensionRegistry {
    /// Creates a registry holding the built-in [`VALIDITY_PERIOD`] check.
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            assertion_checks: Slot::new("assertion check"),
            pseudonym_mappers: Slot::new("pseudonym mapper"),
            token_accessors: Slot::new("token accessor"),
            certificate_specifications: Slot::new("certificate specification"),
        };
        registry.register_certificate_specification(
            VALIDITY_PERIOD,
            Arc::new(ValidityPeriodSpecification),
        );
        registry
    }

    /// Registers an assertion check.
    pub fn register_assertion_check(&self, id: &str, check: Arc<dyn AssertionCheck>) {
        self.assertion_checks.register(id, check);
    }

    /// Registers a pseudonym mapper.
    pub fn register_pseudonym_mapper(&self, id: &str, mapper: Arc<dyn PseudonymMapper>) {
        self.pseudonym_mappers.register(id, mapper);
    }

    /// Registers a token accessor.
    pub fn register_token_accessor(&self, id: &str, accessor: Arc<dyn TokenAccessor>) {
        self.token_accessors.register(id, accessor);
    }

    /// Registers a certificate specification.
    pub fn register_certificate_specification(
        &self,
        id: &str,
        specification: Arc<dyn CertificateSpecification>,
    ) {
        self.certificate_specifications.register(id, specification);
    }

    /// Resolves an assertion check.
    pub fn assertion_check(&self, id: &str) -> SamlResult<Extension<dyn AssertionCheck>> {
        self.assertion_checks.resolve(id)
    }

    /// Resolves a pseudonym mapper.
    pub fn pseudonym_mapper(&self, id: &str) -> SamlResult<Extension<dyn PseudonymMapper>> {
        self.pseudonym_mappers.resolve(id)
    }

    /// Resolves a token accessor.
    pub fn token_accessor(&self, id: &str) -> SamlResult<Extension<dyn TokenAccessor>> {
        self.token_accessors.resolve(id)
    }

    /// Resolves a certificate specification.
    pub fn certificate_specification(
        &self,
        id: &str,
    ) -> SamlResult<Extension<dyn CertificateSpecification>> {
        self.certificate_specifications.resolve(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl PseudonymMapper for Upper {
        fn map_identity(&self, name_id: &NameId) -> String {
            name_id.value.to_uppercase()
        }
    }

    struct RejectAll;

    impl AssertionCheck for RejectAll {
        fn check(&self, _: &Assertion, _: &Element) -> SamlResult<()> {
            Err(SamlError::format("rejected"))
        }
    }

    #[test]
    fn validity_period_is_built_in() {
        let registry = ExtensionRegistry::new();
        let spec = registry.certificate_specification(VALIDITY_PERIOD).unwrap();
        assert_eq!(spec.id(), VALIDITY_PERIOD);
    }

    #[test]
    fn resolves_registered_extensions() {
        let registry = ExtensionRegistry::new();
        registry.register_pseudonym_mapper("upper", Arc::new(Upper));
        registry.register_assertion_check("reject", Arc::new(RejectAll));

        let mapper = registry.pseudonym_mapper("upper").unwrap();
        assert_eq!(mapper.map_identity(&NameId::new("alice")), "ALICE");

        let check = registry.assertion_check("reject").unwrap();
        let element = Element::new("saml:Assertion", crate::types::SAML_NS);
        assert!(check.check(&Assertion::default(), &element).is_err());
    }

    #[test]
    fn unknown_identifier_is_a_configuration_error() {
        let registry = ExtensionRegistry::new();
        assert!(matches!(
            registry.token_accessor("missing"),
            Err(SamlError::Configuration(_))
        ));
    }

    #[test]
    fn debug_lists_identifiers() {
        let registry = ExtensionRegistry::new();
        registry.register_pseudonym_mapper("upper", Arc::new(Upper));
        let debug = format!("{registry:?}");
        assert!(debug.contains("upper"));
        assert!(debug.contains(VALIDITY_PERIOD));
    }
}
