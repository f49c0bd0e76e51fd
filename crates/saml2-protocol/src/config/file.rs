//! TOML configuration file.
//!
//! ```toml
//! allowed_audiences = ["https://sp.example.com"]
//! clock_skew_secs = 180
//!
//! [service_provider]
//! id = "https://sp.example.com"
//! signing_key = "sp.key.pem"
//! signing_certificate = "sp.crt.pem"
//!
//! [[service_provider.endpoints]]
//! kind = "sign_on"
//! url = "https://sp.example.com/saml/login"
//! binding = "post"
//!
//! [[identity_providers]]
//! metadata_file = "idp-metadata.xml"
//! default = true
//! ```
//!
//! Relative paths resolve against the directory of the configuration file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{
    fetch_metadata, ArtifactResolutionSettings, BasicAuth, CommonDomainSettings, Configuration,
    Contact, EndpointKind, IdentityProvider, IdentityProviderEndpoint, MetadataSettings,
    MetadataSource, NameIdFormats, Organization, RequestedAttribute, SelectionSettings,
    ServiceProvider, ServiceProviderEndpoint, DEFAULT_ARTIFACT_LIFETIME, DEFAULT_CLOCK_SKEW,
    DEFAULT_HTTP_TIMEOUT,
};
use crate::error::{SamlError, SamlResult};
use crate::extensions::{ExtensionRegistry, VALIDITY_PERIOD};
use crate::metadata::EntityMetadata;
use crate::signature::{SignatureAlgorithm, SigningCredential};
use crate::types::{NameIdFormat, SamlBinding};

/// Root of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigurationFile {
    /// Service provider section.
    pub service_provider: ServiceProviderSection,
    /// Trusted identity providers.
    #[serde(default)]
    pub identity_providers: Vec<IdentityProviderSection>,
    /// Accepted audiences.
    #[serde(default)]
    pub allowed_audiences: Vec<String>,
    /// Clock skew in seconds.
    pub clock_skew_secs: Option<u64>,
    /// Artifact lifetime in seconds.
    pub artifact_lifetime_secs: Option<u64>,
    /// Outbound HTTP timeout in seconds.
    pub http_timeout_secs: Option<u64>,
    /// Outbound signature algorithm: `rsa-sha256`, `rsa-sha384` or `rsa-sha512`.
    pub signature_algorithm: Option<String>,
    /// Registered certificate specification identifiers.
    #[serde(default = "default_certificate_specifications")]
    pub certificate_specifications: Vec<String>,
    /// SP metadata generation.
    #[serde(default)]
    pub metadata: MetadataSection,
    /// NameID formats.
    #[serde(default)]
    pub name_id_formats: NameIdFormatsSection,
    /// Discovery.
    #[serde(default)]
    pub selection: SelectionSection,
    /// Common domain cookie.
    #[serde(default)]
    pub common_domain: CommonDomainSection,
}

fn default_certificate_specifications() -> Vec<String> {
    vec![VALIDITY_PERIOD.to_string()]
}

fn default_true() -> bool {
    true
}

/// `[service_provider]`
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceProviderSection {
    /// Entity ID.
    pub id: String,
    /// PEM private key path.
    pub signing_key: PathBuf,
    /// PEM certificate path.
    pub signing_certificate: PathBuf,
    /// Exposed endpoints.
    #[serde(default)]
    pub endpoints: Vec<ServiceProviderEndpointSection>,
}

/// `[[service_provider.endpoints]]`
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceProviderEndpointSection {
    /// Endpoint kind.
    pub kind: EndpointKind,
    /// URL.
    pub url: String,
    /// Binding.
    pub binding: Option<SamlBinding>,
    /// Post-flow redirect.
    pub redirect_url: Option<String>,
    /// Index.
    #[serde(default)]
    pub index: u16,
    /// Default endpoint of its kind.
    #[serde(default)]
    pub default: bool,
}

/// `[[identity_providers]]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdentityProviderSection {
    /// Entity ID; taken from metadata when a metadata source is set.
    pub id: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Default identity provider.
    pub default: bool,
    /// See [`IdentityProvider::allow_idp_initiated_sso`].
    pub allow_idp_initiated_sso: bool,
    /// See [`IdentityProvider::allow_replay`].
    pub allow_replay: bool,
    /// See [`IdentityProvider::omit_assertion_signature_check`].
    pub omit_assertion_signature_check: bool,
    /// See [`IdentityProvider::quirks_mode`].
    pub quirks_mode: bool,
    /// See [`IdentityProvider::force_authn`].
    pub force_authn: bool,
    /// See [`IdentityProvider::is_passive`].
    pub is_passive: bool,
    /// Metadata document path.
    pub metadata_file: Option<PathBuf>,
    /// Metadata document URL.
    pub metadata_url: Option<String>,
    /// Registered assertion check identifier.
    pub assertion_check: Option<String>,
    /// Registered pseudonym mapper identifier.
    pub pseudonym_mapper: Option<String>,
    /// Artifact resolution credentials.
    pub artifact_resolution: ArtifactResolutionSection,
    /// Endpoints overriding metadata.
    pub endpoints: Vec<IdentityProviderEndpointSection>,
}

/// `[identity_providers.artifact_resolution]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArtifactResolutionSection {
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// PEM file with client certificate and key.
    pub client_identity: Option<PathBuf>,
}

/// `[[identity_providers.endpoints]]`
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityProviderEndpointSection {
    /// Endpoint kind.
    pub kind: EndpointKind,
    /// Binding.
    pub binding: Option<SamlBinding>,
    /// URL; empty takes it from metadata.
    #[serde(default)]
    pub url: String,
    /// Artifact endpoint index.
    pub index: Option<u16>,
    /// Registered token accessor identifier.
    pub token_accessor: Option<String>,
}

/// `[metadata]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataSection {
    /// `WantAssertionsSigned`.
    pub want_assertions_signed: bool,
    /// Publish artifact resolution services.
    pub include_artifact_endpoints: bool,
    /// Organization.
    pub organization: Option<Organization>,
    /// Contacts.
    pub contacts: Vec<Contact>,
    /// Requested attributes.
    pub requested_attributes: Vec<RequestedAttribute>,
}

impl Default for MetadataSection {
    fn default() -> Self {
        Self {
            want_assertions_signed: default_true(),
            include_artifact_endpoints: default_true(),
            organization: None,
            contacts: Vec::new(),
            requested_attributes: Vec::new(),
        }
    }
}

/// `[name_id_formats]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NameIdFormatsSection {
    /// `AllowCreate`.
    pub allow_create: Option<bool>,
    /// Format URIs.
    pub formats: Vec<String>,
}

/// `[selection]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SelectionSection {
    /// Discovery page.
    pub selection_url: Option<String>,
}

/// `[common_domain]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommonDomainSection {
    /// Read the common domain cookie.
    pub enabled: bool,
}

fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn read_file(path: &Path) -> SamlResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| SamlError::Configuration(format!("cannot read {}: {e}", path.display())))
}

fn parse_signature_algorithm(name: &str) -> SamlResult<SignatureAlgorithm> {
    match name.to_ascii_lowercase().as_str() {
        "rsa-sha256" => Ok(SignatureAlgorithm::RsaSha256),
        "rsa-sha384" => Ok(SignatureAlgorithm::RsaSha384),
        "rsa-sha512" => Ok(SignatureAlgorithm::RsaSha512),
        other => SignatureAlgorithm::from_uri(other)
            .filter(|alg| !alg.is_deprecated())
            .ok_or_else(|| {
                SamlError::Configuration(format!("unsupported signature algorithm {name}"))
            }),
    }
}

impl ConfigurationFile {
    /// Resolves files and extension identifiers into a snapshot.
    pub fn resolve(self, base_dir: &Path, registry: &ExtensionRegistry) -> SamlResult<Configuration> {
        let http_timeout = self
            .http_timeout_secs
            .map_or(DEFAULT_HTTP_TIMEOUT, Duration::from_secs);

        let service_provider = self.service_provider.resolve(base_dir)?;
        let identity_providers = self
            .identity_providers
            .into_iter()
            .map(|section| section.resolve(base_dir, registry, http_timeout))
            .collect::<SamlResult<Vec<_>>>()?;

        let mut config = Configuration::new(service_provider, identity_providers)?;
        config.allowed_audiences = self.allowed_audiences;
        config.http_timeout = http_timeout;
        config.clock_skew = self.clock_skew_secs.map_or(DEFAULT_CLOCK_SKEW, Duration::from_secs);
        config.artifact_lifetime = self
            .artifact_lifetime_secs
            .map_or(DEFAULT_ARTIFACT_LIFETIME, Duration::from_secs);
        if let Some(name) = &self.signature_algorithm {
            config.signature_algorithm = parse_signature_algorithm(name)?;
        }
        config.certificate_specifications = self
            .certificate_specifications
            .iter()
            .map(|id| registry.certificate_specification(id).map(|ext| ext.shared()))
            .collect::<SamlResult<Vec<_>>>()?;
        config.metadata = MetadataSettings {
            want_assertions_signed: self.metadata.want_assertions_signed,
            include_artifact_endpoints: self.metadata.include_artifact_endpoints,
            organization: self.metadata.organization,
            contacts: self.metadata.contacts,
            requested_attributes: self.metadata.requested_attributes,
        };
        config.name_id_formats = NameIdFormats {
            allow_create: self.name_id_formats.allow_create,
            formats: self
                .name_id_formats
                .formats
                .iter()
                .map(|uri| {
                    NameIdFormat::from_uri(uri).ok_or_else(|| {
                        SamlError::Configuration(format!("unknown NameID format {uri}"))
                    })
                })
                .collect::<SamlResult<Vec<_>>>()?,
        };
        config.selection = SelectionSettings {
            selection_url: self.selection.selection_url,
        };
        config.common_domain = CommonDomainSettings {
            enabled: self.common_domain.enabled,
        };

        tracing::debug!(
            sp = %config.service_provider.id,
            identity_providers = config.identity_providers.len(),
            "configuration loaded"
        );
        Ok(config)
    }
}

impl ServiceProviderSection {
    fn resolve(self, base_dir: &Path) -> SamlResult<ServiceProvider> {
        let key_pem = read_file(&resolve_path(base_dir, &self.signing_key))?;
        let cert_pem = read_file(&resolve_path(base_dir, &self.signing_certificate))?;
        let credential = SigningCredential::from_pem(&key_pem, &cert_pem)
            .map_err(|e| SamlError::Configuration(format!("signing credential: {e}")))?;

        let endpoints = self
            .endpoints
            .into_iter()
            .map(|e| ServiceProviderEndpoint {
                kind: e.kind,
                binding: e.binding,
                url: e.url,
                redirect_url: e.redirect_url,
                index: e.index,
                is_default: e.default,
            })
            .collect();

        Ok(ServiceProvider {
            id: self.id,
            credential: Arc::new(credential),
            endpoints,
        })
    }
}

impl IdentityProviderSection {
    fn resolve(
        self,
        base_dir: &Path,
        registry: &ExtensionRegistry,
        http_timeout: Duration,
    ) -> SamlResult<IdentityProvider> {
        let source = match (&self.metadata_file, &self.metadata_url) {
            (Some(_), Some(_)) => {
                return Err(SamlError::Configuration(
                    "identity provider sets both metadata_file and metadata_url".to_string(),
                ))
            }
            (Some(path), None) => Some(MetadataSource::File(resolve_path(base_dir, path))),
            (None, Some(url)) => Some(MetadataSource::Url(url.clone())),
            (None, None) => None,
        };

        let mut idp = match (&source, &self.id) {
            (Some(source), _) => {
                let metadata = EntityMetadata::parse(&fetch_metadata(source, http_timeout)?)?;
                if let Some(id) = self.id.as_deref().filter(|id| *id != metadata.entity_id) {
                    tracing::warn!(
                        configured = id,
                        entity_id = %metadata.entity_id,
                        "identity provider id replaced by metadata entity id"
                    );
                }
                IdentityProvider::from_metadata(metadata)
            }
            (None, Some(id)) => IdentityProvider::new(id.clone()),
            (None, None) => {
                return Err(SamlError::Configuration(
                    "identity provider needs an id or a metadata source".to_string(),
                ))
            }
        };

        if let Some(name) = self.name {
            idp.name = name;
        }
        idp.default = self.default;
        idp.allow_idp_initiated_sso = self.allow_idp_initiated_sso;
        idp.allow_replay = self.allow_replay;
        idp.omit_assertion_signature_check = self.omit_assertion_signature_check;
        idp.quirks_mode = self.quirks_mode;
        idp.force_authn = self.force_authn;
        idp.is_passive = self.is_passive;
        idp.metadata_source = source;

        idp.artifact_resolution = ArtifactResolutionSettings {
            basic_auth: match (self.artifact_resolution.username, self.artifact_resolution.password) {
                (Some(username), Some(password)) => Some(BasicAuth { username, password }),
                (None, None) => None,
                _ => {
                    return Err(SamlError::Configuration(format!(
                        "artifact resolution for {} needs both username and password",
                        idp.id
                    )))
                }
            },
            client_identity_pem: self
                .artifact_resolution
                .client_identity
                .map(|path| read_file(&resolve_path(base_dir, &path)))
                .transpose()?,
        };

        idp.assertion_check = self
            .assertion_check
            .map(|id| registry.assertion_check(&id))
            .transpose()?;
        idp.pseudonym_mapper = self
            .pseudonym_mapper
            .map(|id| registry.pseudonym_mapper(&id))
            .transpose()?;

        idp.endpoints = self
            .endpoints
            .into_iter()
            .map(|e| {
                Ok(IdentityProviderEndpoint {
                    kind: e.kind,
                    binding: e.binding,
                    url: e.url,
                    index: e.index,
                    token_accessor: e
                        .token_accessor
                        .map(|id| registry.token_accessor(&id))
                        .transpose()?,
                })
            })
            .collect::<SamlResult<Vec<_>>>()?;

        Ok(idp)
    }
}
