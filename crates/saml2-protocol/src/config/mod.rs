//! Service provider configuration.
//!
//! A [`Configuration`] is an immutable snapshot: the SP identity and signing
//! credential, the trusted identity providers with their parsed metadata,
//! and the engine settings. It is loaded from a TOML file (see [`file`]) or
//! assembled in code, and shared through a [`ConfigurationHandle`] that
//! swaps in a new snapshot when identity provider metadata changes.

pub mod file;
mod handle;

pub use file::ConfigurationFile;
pub use handle::{fetch_metadata, ConfigurationHandle, MetadataSource};

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{SamlError, SamlResult};
use crate::extensions::{AssertionCheck, Extension, ExtensionRegistry, PseudonymMapper, TokenAccessor};
use crate::metadata::EntityMetadata;
use crate::signature::{
    CertificateSpecification, SignatureAlgorithm, SignatureConfig, SigningCredential,
    ValidityPeriodSpecification, VerificationKey, XmlSigner,
};
use crate::types::{NameIdFormat, SamlBinding};

/// Default tolerance applied to time restrictions.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(180);

/// Default lifetime of an issued artifact.
pub const DEFAULT_ARTIFACT_LIFETIME: Duration = Duration::from_secs(300);

/// Default timeout of outbound HTTP calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// What an endpoint is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Single sign-on (assertion consumer on the SP side).
    SignOn,
    /// Single logout.
    Logout,
    /// Metadata publication.
    Metadata,
}

/// An endpoint the service provider exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProviderEndpoint {
    /// Endpoint kind.
    pub kind: EndpointKind,
    /// Binding used when sending from this endpoint; `None` leaves the
    /// choice to endpoint selection.
    pub binding: Option<SamlBinding>,
    /// Absolute URL of the endpoint.
    pub url: String,
    /// Where to send the browser after the flow completes.
    pub redirect_url: Option<String>,
    /// Endpoint index, used for artifacts and metadata.
    pub index: u16,
    /// Whether this is the default endpoint of its kind.
    pub is_default: bool,
}

impl ServiceProviderEndpoint {
    /// Creates an endpoint with index 0.
    pub fn new(kind: EndpointKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            binding: None,
            url: url.into(),
            redirect_url: None,
            index: 0,
            is_default: false,
        }
    }

    /// Sets the binding.
    #[must_use]
    pub fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Sets the index.
    #[must_use]
    pub fn with_index(mut self, index: u16) -> Self {
        self.index = index;
        self
    }

    /// Sets the post-flow redirect.
    #[must_use]
    pub fn with_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }
}

/// The service provider's identity.
#[derive(Debug, Clone)]
pub struct ServiceProvider {
    /// Entity ID.
    pub id: String,
    /// Signing key and certificate.
    pub credential: Arc<SigningCredential>,
    /// Exposed endpoints.
    pub endpoints: Vec<ServiceProviderEndpoint>,
}

impl ServiceProvider {
    /// Creates a service provider without endpoints.
    pub fn new(id: impl Into<String>, credential: SigningCredential) -> Self {
        Self {
            id: id.into(),
            credential: Arc::new(credential),
            endpoints: Vec::new(),
        }
    }

    /// Adds an endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: ServiceProviderEndpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// The default endpoint of `kind`, else the first one.
    #[must_use]
    pub fn endpoint(&self, kind: EndpointKind) -> Option<&ServiceProviderEndpoint> {
        let mut candidates = self.endpoints.iter().filter(|e| e.kind == kind);
        let first = candidates.clone().next();
        candidates.find(|e| e.is_default).or(first)
    }

    /// Like [`Self::endpoint`], failing when the kind is not configured.
    pub fn require_endpoint(&self, kind: EndpointKind) -> SamlResult<&ServiceProviderEndpoint> {
        self.endpoint(kind).ok_or_else(|| {
            SamlError::Configuration(format!("service provider has no {kind:?} endpoint"))
        })
    }
}

/// An endpoint configured for an identity provider, overriding metadata.
#[derive(Debug, Clone)]
pub struct IdentityProviderEndpoint {
    /// Endpoint kind.
    pub kind: EndpointKind,
    /// Binding; `None` leaves it to selection.
    pub binding: Option<SamlBinding>,
    /// URL; empty takes the URL from metadata.
    pub url: String,
    /// Artifact endpoint index.
    pub index: Option<u16>,
    /// Receives assertions accepted through this endpoint.
    pub token_accessor: Option<Extension<dyn TokenAccessor>>,
}

impl IdentityProviderEndpoint {
    /// Creates an endpoint.
    pub fn new(kind: EndpointKind, binding: Option<SamlBinding>, url: impl Into<String>) -> Self {
        Self {
            kind,
            binding,
            url: url.into(),
            index: None,
            token_accessor: None,
        }
    }
}

/// HTTP basic credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Credentials presented when resolving artifacts at an identity provider.
#[derive(Clone, Default)]
pub struct ArtifactResolutionSettings {
    /// HTTP basic authentication.
    pub basic_auth: Option<BasicAuth>,
    /// PEM bundle with the client certificate and its private key.
    pub client_identity_pem: Option<String>,
}

impl fmt::Debug for ArtifactResolutionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactResolutionSettings")
            .field("basic_auth", &self.basic_auth)
            .field("client_identity", &self.client_identity_pem.is_some())
            .finish()
    }
}

/// A trusted identity provider.
#[derive(Debug, Clone)]
pub struct IdentityProvider {
    /// Entity ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Selected when nothing else picks an identity provider.
    pub default: bool,
    /// Accept responses without `InResponseTo`.
    pub allow_idp_initiated_sso: bool,
    /// Skip the `InResponseTo` correlation check.
    pub allow_replay: bool,
    /// Accept unsigned assertions.
    pub omit_assertion_signature_check: bool,
    /// Relax validation rules commonly violated in the wild.
    pub quirks_mode: bool,
    /// Request `ForceAuthn`.
    pub force_authn: bool,
    /// Request `IsPassive`.
    pub is_passive: bool,
    /// Endpoints overriding metadata.
    pub endpoints: Vec<IdentityProviderEndpoint>,
    /// Parsed metadata.
    pub metadata: Option<Arc<EntityMetadata>>,
    /// Where the metadata is reloaded from.
    pub metadata_source: Option<MetadataSource>,
    /// Artifact resolution credentials.
    pub artifact_resolution: ArtifactResolutionSettings,
    /// Extra assertion validation.
    pub assertion_check: Option<Extension<dyn AssertionCheck>>,
    /// Maps the released NameID to a local identity.
    pub pseudonym_mapper: Option<Extension<dyn PseudonymMapper>>,
}

impl IdentityProvider {
    /// Creates an identity provider named after its entity ID.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            default: false,
            allow_idp_initiated_sso: false,
            allow_replay: false,
            omit_assertion_signature_check: false,
            quirks_mode: false,
            force_authn: false,
            is_passive: false,
            endpoints: Vec::new(),
            metadata: None,
            metadata_source: None,
            artifact_resolution: ArtifactResolutionSettings::default(),
            assertion_check: None,
            pseudonym_mapper: None,
        }
    }

    /// Creates an identity provider from its metadata.
    #[must_use]
    pub fn from_metadata(metadata: EntityMetadata) -> Self {
        Self::new(metadata.entity_id.clone()).with_metadata(metadata)
    }

    /// Replaces the metadata, re-deriving the ID from its entity ID.
    ///
    /// A name that was derived from the old ID follows the new one.
    #[must_use]
    pub fn with_metadata(mut self, metadata: EntityMetadata) -> Self {
        if self.name == self.id {
            self.name.clone_from(&metadata.entity_id);
        }
        self.id.clone_from(&metadata.entity_id);
        self.metadata = Some(Arc::new(metadata));
        self
    }

    /// Adds an endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: IdentityProviderEndpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// The configured endpoint of `kind`.
    #[must_use]
    pub fn endpoint(&self, kind: EndpointKind) -> Option<&IdentityProviderEndpoint> {
        self.endpoints.iter().find(|e| e.kind == kind)
    }

    /// Returns true if metadata is loaded.
    #[must_use]
    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    /// Metadata signing keys that satisfy every specification.
    #[must_use]
    pub fn signing_keys(
        &self,
        specifications: &[Arc<dyn CertificateSpecification>],
    ) -> Vec<VerificationKey> {
        self.metadata
            .as_ref()
            .map(|md| md.signing_keys(specifications))
            .unwrap_or_default()
    }
}

/// The organization published in SP metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Organization {
    /// `OrganizationName`.
    pub name: String,
    /// `OrganizationDisplayName`.
    pub display_name: String,
    /// `OrganizationURL`.
    pub url: String,
}

/// Contact type of a metadata contact person.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactType {
    /// `technical`
    #[default]
    Technical,
    /// `support`
    Support,
    /// `administrative`
    Administrative,
    /// `billing`
    Billing,
    /// `other`
    Other,
}

impl ContactType {
    /// The `contactType` attribute value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Support => "support",
            Self::Administrative => "administrative",
            Self::Billing => "billing",
            Self::Other => "other",
        }
    }
}

/// A metadata contact person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Contact {
    /// Contact type.
    pub contact_type: ContactType,
    /// `Company`.
    pub company: Option<String>,
    /// `GivenName`.
    pub given_name: Option<String>,
    /// `SurName`.
    pub surname: Option<String>,
    /// `EmailAddress`.
    pub email: Option<String>,
    /// `TelephoneNumber`.
    pub telephone: Option<String>,
}

/// An attribute requested in SP metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestedAttribute {
    /// Attribute name.
    pub name: String,
    /// `isRequired`.
    #[serde(default)]
    pub required: bool,
}

/// SP metadata generation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSettings {
    /// `WantAssertionsSigned`.
    pub want_assertions_signed: bool,
    /// Publish artifact resolution services.
    pub include_artifact_endpoints: bool,
    /// Organization.
    pub organization: Option<Organization>,
    /// Contact people.
    pub contacts: Vec<Contact>,
    /// Requested attributes.
    pub requested_attributes: Vec<RequestedAttribute>,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            want_assertions_signed: true,
            include_artifact_endpoints: true,
            organization: None,
            contacts: Vec::new(),
            requested_attributes: Vec::new(),
        }
    }
}

/// NameID formats the SP asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameIdFormats {
    /// Passed through to `NameIDPolicy/@AllowCreate`.
    pub allow_create: Option<bool>,
    /// Formats published in metadata; the first is requested.
    pub formats: Vec<NameIdFormat>,
}

/// Identity provider discovery settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSettings {
    /// Page that lets the user choose an identity provider.
    pub selection_url: Option<String>,
}

/// Common domain cookie settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonDomainSettings {
    /// Read `_saml_idp` during selection.
    pub enabled: bool,
}

/// An immutable configuration snapshot.
#[derive(Clone)]
pub struct Configuration {
    /// The service provider.
    pub service_provider: ServiceProvider,
    /// Trusted identity providers, unique by ID.
    pub identity_providers: Vec<IdentityProvider>,
    /// Audiences accepted in audience restrictions.
    pub allowed_audiences: Vec<String>,
    /// SP metadata settings.
    pub metadata: MetadataSettings,
    /// NameID formats.
    pub name_id_formats: NameIdFormats,
    /// Tolerance applied to time restrictions.
    pub clock_skew: Duration,
    /// Lifetime of issued artifacts.
    pub artifact_lifetime: Duration,
    /// Timeout of outbound HTTP calls.
    pub http_timeout: Duration,
    /// Algorithm used for outbound signatures.
    pub signature_algorithm: SignatureAlgorithm,
    /// Discovery settings.
    pub selection: SelectionSettings,
    /// Common domain cookie settings.
    pub common_domain: CommonDomainSettings,
    /// Predicates certificates must satisfy before their keys are trusted.
    pub certificate_specifications: Vec<Arc<dyn CertificateSpecification>>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("service_provider", &self.service_provider.id)
            .field(
                "identity_providers",
                &self
                    .identity_providers
                    .iter()
                    .map(|idp| idp.id.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("allowed_audiences", &self.allowed_audiences)
            .field("clock_skew", &self.clock_skew)
            .field("artifact_lifetime", &self.artifact_lifetime)
            .field("signature_algorithm", &self.signature_algorithm)
            .finish_non_exhaustive()
    }
}

impl Configuration {
    /// Assembles a configuration with default settings.
    ///
    /// Fails when two identity providers share an ID.
    pub fn new(
        service_provider: ServiceProvider,
        identity_providers: Vec<IdentityProvider>,
    ) -> SamlResult<Self> {
        let config = Self {
            service_provider,
            identity_providers,
            allowed_audiences: Vec::new(),
            metadata: MetadataSettings::default(),
            name_id_formats: NameIdFormats::default(),
            clock_skew: DEFAULT_CLOCK_SKEW,
            artifact_lifetime: DEFAULT_ARTIFACT_LIFETIME,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            signature_algorithm: SignatureAlgorithm::default(),
            selection: SelectionSettings::default(),
            common_domain: CommonDomainSettings::default(),
            certificate_specifications: vec![Arc::new(ValidityPeriodSpecification)],
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML configuration file. Relative paths inside it resolve
    /// against the file's directory.
    pub fn from_file(path: impl AsRef<Path>, registry: &ExtensionRegistry) -> SamlResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SamlError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base_dir, registry)
    }

    /// Loads configuration from TOML text.
    pub fn from_toml_str(
        content: &str,
        base_dir: &Path,
        registry: &ExtensionRegistry,
    ) -> SamlResult<Self> {
        let file: ConfigurationFile = toml::from_str(content)
            .map_err(|e| SamlError::Configuration(format!("failed to parse config: {e}")))?;
        file.resolve(base_dir, registry)
    }

    /// Checks the snapshot invariants.
    pub fn validate(&self) -> SamlResult<()> {
        if self.service_provider.id.trim().is_empty() {
            return Err(SamlError::Configuration(
                "service provider id must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for idp in &self.identity_providers {
            if idp.id.trim().is_empty() {
                return Err(SamlError::Configuration(
                    "identity provider id must not be empty".to_string(),
                ));
            }
            if !seen.insert(idp.id.as_str()) {
                return Err(SamlError::Configuration(format!(
                    "duplicate identity provider id {}",
                    idp.id
                )));
            }
        }
        Ok(())
    }

    /// Sets the allowed audiences.
    #[must_use]
    pub fn with_allowed_audiences<I, S>(mut self, audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_audiences = audiences.into_iter().map(Into::into).collect();
        self
    }

    /// Looks up an identity provider by ID.
    #[must_use]
    pub fn identity_provider(&self, id: &str) -> Option<&IdentityProvider> {
        self.identity_providers.iter().find(|idp| idp.id == id)
    }

    /// Like [`Self::identity_provider`], failing for unknown IDs.
    pub fn require_identity_provider(&self, id: &str) -> SamlResult<&IdentityProvider> {
        self.identity_provider(id)
            .ok_or_else(|| SamlError::UnknownIdentityProvider(id.to_string()))
    }

    /// A signer over the SP credential with the configured algorithm.
    #[must_use]
    pub fn signer(&self) -> XmlSigner<'_> {
        XmlSigner::new(&self.service_provider.credential).with_config(SignatureConfig {
            algorithm: self.signature_algorithm,
            ..SignatureConfig::default()
        })
    }

    /// Metadata keys of `idp` under the configured certificate specifications.
    #[must_use]
    pub fn identity_provider_keys(&self, idp: &IdentityProvider) -> Vec<VerificationKey> {
        idp.signing_keys(&self.certificate_specifications)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SP_KEY: &str = include_str!("../../testdata/sp.key.pem");
    const SP_CERT: &str = include_str!("../../testdata/sp.crt.pem");
    const METADATA: &str = include_str!("../../testdata/idp-metadata.xml");

    fn sp() -> ServiceProvider {
        ServiceProvider::new(
            "https://sp.example.com",
            SigningCredential::from_pem(SP_KEY, SP_CERT).unwrap(),
        )
    }

    #[test]
    fn duplicate_identity_providers_are_rejected() {
        let result = Configuration::new(
            sp(),
            vec![IdentityProvider::new("idp1"), IdentityProvider::new("idp1")],
        );
        assert!(matches!(result, Err(SamlError::Configuration(_))));
    }

    #[test]
    fn defaults() {
        let config = Configuration::new(sp(), vec![IdentityProvider::new("idp1")]).unwrap();
        assert_eq!(config.clock_skew, DEFAULT_CLOCK_SKEW);
        assert_eq!(config.signature_algorithm, SignatureAlgorithm::RsaSha256);
        assert_eq!(config.certificate_specifications.len(), 1);
        assert!(config.identity_provider("idp1").is_some());
        assert!(matches!(
            config.require_identity_provider("nope"),
            Err(SamlError::UnknownIdentityProvider(_))
        ));
        assert!(format!("{config:?}").contains("idp1"));
    }

    #[test]
    fn metadata_rederives_identity() {
        let md = EntityMetadata::parse(METADATA).unwrap();
        let idp = IdentityProvider::new("old").with_metadata(md.clone());
        assert_eq!(idp.id, "https://idp.example.com");
        assert_eq!(idp.name, "https://idp.example.com");
        assert!(idp.has_metadata());

        let mut named = IdentityProvider::new("old");
        named.name = "Friendly".to_string();
        let named = named.with_metadata(md);
        assert_eq!(named.name, "Friendly");
    }

    #[test]
    fn service_provider_prefers_default_endpoint() {
        let mut second = ServiceProviderEndpoint::new(EndpointKind::SignOn, "https://sp/acs2");
        second.is_default = true;
        let sp = sp()
            .with_endpoint(ServiceProviderEndpoint::new(EndpointKind::SignOn, "https://sp/acs1"))
            .with_endpoint(second);
        assert_eq!(sp.endpoint(EndpointKind::SignOn).unwrap().url, "https://sp/acs2");
        assert!(sp.require_endpoint(EndpointKind::Logout).is_err());
    }

    #[test]
    fn secrets_are_redacted() {
        let settings = ArtifactResolutionSettings {
            basic_auth: Some(BasicAuth {
                username: "sp".into(),
                password: "hunter2".into(),
            }),
            client_identity_pem: Some("-----BEGIN".into()),
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("BEGIN"));
    }
}
