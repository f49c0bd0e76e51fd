//! SAML 2.0 federation metadata.
//!
//! Reads identity provider entity descriptors (single `md:EntityDescriptor`
//! documents or `md:EntitiesDescriptor` aggregates) and generates the
//! service provider's own signed metadata.

mod generator;

pub use generator::{MetadataEncoding, MetadataGenerator};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use saml2_crypto::X509Certificate;

use crate::error::{SamlError, SamlResult};
use crate::signature::{self, CertificateSpecification, VerificationKey};
use crate::types::{parse_instant, SamlBinding, MD_NS, XMLDSIG_NS};
use crate::xml::{Element, XmlDocument};

/// An endpoint advertised in metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEndpoint {
    /// Binding, `None` when the binding URI is not one this engine speaks.
    pub binding: Option<SamlBinding>,
    /// `Location`.
    pub location: String,
    /// `ResponseLocation`.
    pub response_location: Option<String>,
    /// `index` of indexed endpoints.
    pub index: Option<u16>,
    /// `isDefault` of indexed endpoints.
    pub is_default: bool,
}

impl MetadataEndpoint {
    fn from_element(el: &Element) -> Option<Self> {
        let location = el.attribute("Location")?.trim().to_string();
        Some(Self {
            binding: el.attribute("Binding").and_then(SamlBinding::from_uri),
            location,
            response_location: el.attribute("ResponseLocation").map(str::to_string),
            index: el.attribute("index").and_then(|i| i.trim().parse().ok()),
            is_default: el.attribute("isDefault").is_some_and(|v| v == "true" || v == "1"),
        })
    }
}

/// Returns the first endpoint with `binding`.
#[must_use]
pub fn endpoint_for_binding(
    endpoints: &[MetadataEndpoint],
    binding: SamlBinding,
) -> Option<&MetadataEndpoint> {
    endpoints.iter().find(|e| e.binding == Some(binding))
}

/// The parts of an identity provider's entity descriptor the SP uses.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    /// `entityID`.
    pub entity_id: String,
    /// `md:OrganizationDisplayName`, if any.
    pub organization_name: Option<String>,
    /// `validUntil`, if any.
    pub valid_until: Option<DateTime<Utc>>,
    /// Certificates of signing (or unqualified) key descriptors.
    pub signing_certificates: Vec<X509Certificate>,
    /// `md:SingleSignOnService` endpoints.
    pub single_sign_on_services: Vec<MetadataEndpoint>,
    /// `md:SingleLogoutService` endpoints.
    pub single_logout_services: Vec<MetadataEndpoint>,
    /// `md:ArtifactResolutionService` endpoints.
    pub artifact_resolution_services: Vec<MetadataEndpoint>,
    /// `md:AttributeService` endpoints of an attribute authority.
    pub attribute_services: Vec<MetadataEndpoint>,
}

impl EntityMetadata {
    /// Parses a metadata document and returns every identity provider or
    /// attribute authority it describes.
    ///
    /// A signed document must carry a signature that verifies with its own
    /// key info.
    pub fn parse_document(xml: &str) -> SamlResult<Vec<Self>> {
        let doc = XmlDocument::parse(xml)?;
        if signature::is_signed(&doc) && !signature::check_signature(&doc, &[]) {
            return Err(SamlError::Security(
                "Metadata signature could not be verified".to_string(),
            ));
        }

        let root = doc.root();
        let entities: Vec<Self> = if root.is(MD_NS, "EntityDescriptor") {
            Self::from_element(root)?.into_iter().collect()
        } else if root.is(MD_NS, "EntitiesDescriptor") {
            let mut entities = Vec::new();
            collect_entities(root, &mut entities)?;
            entities
        } else {
            return Err(SamlError::format(format!(
                "Unexpected metadata root element {}",
                root.qualified_name()
            )));
        };
        Ok(entities)
    }

    /// Parses a document describing exactly one identity provider.
    pub fn parse(xml: &str) -> SamlResult<Self> {
        let mut entities = Self::parse_document(xml)?;
        match entities.len() {
            1 => Ok(entities.remove(0)),
            0 => Err(SamlError::format(
                "Metadata does not describe an identity provider",
            )),
            n => Err(SamlError::format(format!(
                "Metadata describes {n} identity providers, expected one"
            ))),
        }
    }

    /// Reads an `md:EntityDescriptor`. Returns `None` for entities with
    /// neither an IdP nor an attribute authority role.
    pub fn from_element(el: &Element) -> SamlResult<Option<Self>> {
        let entity_id = el
            .attribute("entityID")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SamlError::format("EntityDescriptor must have an entityID"))?
            .to_string();

        let idp = el.find_child(MD_NS, "IDPSSODescriptor");
        let attribute_authority = el.find_child(MD_NS, "AttributeAuthorityDescriptor");
        if idp.is_none() && attribute_authority.is_none() {
            return Ok(None);
        }

        let mut signing_certificates = Vec::new();
        for role in idp.iter().chain(attribute_authority.iter()) {
            for descriptor in role.find_children(MD_NS, "KeyDescriptor") {
                if descriptor.attribute("use").is_some_and(|u| u != "signing") {
                    continue;
                }
                for data in descriptor
                    .find_children(XMLDSIG_NS, "KeyInfo")
                    .flat_map(|ki| ki.find_children(XMLDSIG_NS, "X509Data"))
                {
                    for cert in data.find_children(XMLDSIG_NS, "X509Certificate") {
                        let certificate = X509Certificate::from_base64(&cert.text_content())?;
                        if !signing_certificates.contains(&certificate) {
                            signing_certificates.push(certificate);
                        }
                    }
                }
            }
        }

        let endpoints = |role: Option<&Element>, name: &str| -> Vec<MetadataEndpoint> {
            role.map(|r| {
                r.find_children(MD_NS, name)
                    .filter_map(MetadataEndpoint::from_element)
                    .collect()
            })
            .unwrap_or_default()
        };

        let valid_until = el
            .attribute("validUntil")
            .map(parse_instant)
            .transpose()?;
        if valid_until.is_some_and(|until| until < Utc::now()) {
            tracing::warn!(entity_id, "metadata validUntil has passed");
        }

        Ok(Some(Self {
            organization_name: el
                .find_child(MD_NS, "Organization")
                .and_then(|org| org.child_text(MD_NS, "OrganizationDisplayName")),
            valid_until,
            signing_certificates,
            single_sign_on_services: endpoints(idp, "SingleSignOnService"),
            single_logout_services: endpoints(idp, "SingleLogoutService"),
            artifact_resolution_services: endpoints(idp, "ArtifactResolutionService"),
            attribute_services: endpoints(attribute_authority, "AttributeService"),
            entity_id,
        }))
    }

    /// Keys of the signing certificates that satisfy every specification.
    #[must_use]
    pub fn signing_keys(
        &self,
        specifications: &[Arc<dyn CertificateSpecification>],
    ) -> Vec<VerificationKey> {
        self.signing_certificates
            .iter()
            .filter(|cert| specifications.iter().all(|s| s.is_satisfied_by(cert)))
            .map(|cert| cert.public_key().clone())
            .collect()
    }

    /// Returns true if a single sign-on endpoint uses `binding`.
    #[must_use]
    pub fn supports_sign_on_binding(&self, binding: SamlBinding) -> bool {
        endpoint_for_binding(&self.single_sign_on_services, binding).is_some()
    }

    /// The artifact resolution endpoint with `index`, falling back to the
    /// default one and then the first.
    #[must_use]
    pub fn artifact_resolution_endpoint(&self, index: u16) -> Option<&MetadataEndpoint> {
        let services = &self.artifact_resolution_services;
        services
            .iter()
            .find(|e| e.index == Some(index))
            .or_else(|| services.iter().find(|e| e.is_default))
            .or_else(|| services.first())
    }

    /// The SOAP attribute service, if any.
    #[must_use]
    pub fn attribute_service(&self) -> Option<&MetadataEndpoint> {
        endpoint_for_binding(&self.attribute_services, SamlBinding::Soap)
    }
}

fn collect_entities(el: &Element, out: &mut Vec<EntityMetadata>) -> SamlResult<()> {
    for child in el.child_elements() {
        if child.is(MD_NS, "EntityDescriptor") {
            if let Some(entity) = EntityMetadata::from_element(child)? {
                out.push(entity);
            }
        } else if child.is(MD_NS, "EntitiesDescriptor") {
            collect_entities(child, out)?;
        }
    }
    Ok(())
}
