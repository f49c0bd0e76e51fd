//! Service provider metadata generation.

use crate::config::{Configuration, EndpointKind};
use crate::error::SamlResult;
use crate::types::{prefixes, SamlBinding, MD_NS, SAMLP_NS, SAML_NS, XMLDSIG_NS};
use crate::xml::{Element, XmlDocument, XML_NS};

/// Character encoding of the generated document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetadataEncoding {
    /// UTF-8 without a byte order mark.
    #[default]
    Utf8,
    /// UTF-16 little endian with a byte order mark.
    Utf16,
}

impl MetadataEncoding {
    /// Value of the XML declaration's `encoding`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16 => "UTF-16",
        }
    }
}

fn md(local: &str) -> Element {
    Element::new(&format!("{}:{local}", prefixes::MD), MD_NS)
}

fn ds(local: &str) -> Element {
    Element::new(&format!("{}:{local}", prefixes::DS), XMLDSIG_NS)
}

/// Produces the signed metadata document of the configured service provider.
#[derive(Debug)]
pub struct MetadataGenerator<'a> {
    config: &'a Configuration,
}

impl<'a> MetadataGenerator<'a> {
    /// Creates a generator over a configuration snapshot.
    #[must_use]
    pub fn new(config: &'a Configuration) -> Self {
        Self { config }
    }

    /// Builds, signs and encodes the metadata document.
    pub fn generate(&self, encoding: MetadataEncoding) -> SamlResult<Vec<u8>> {
        let id = saml2_crypto::generate_message_id();
        let mut doc = XmlDocument::from_root(self.entity_descriptor(&id));
        self.config.signer().sign_document(&mut doc, &id)?;

        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"{}\"?>{}",
            encoding.label(),
            doc.to_xml()
        );
        tracing::debug!(sp = %self.config.service_provider.id, ?encoding, "metadata generated");

        Ok(match encoding {
            MetadataEncoding::Utf8 => xml.into_bytes(),
            MetadataEncoding::Utf16 => {
                let mut bytes = vec![0xFF, 0xFE];
                bytes.extend(xml.encode_utf16().flat_map(u16::to_le_bytes));
                bytes
            }
        })
    }

    fn entity_descriptor(&self, id: &str) -> Element {
        let settings = &self.config.metadata;
        let organization = settings.organization.as_ref().map(|org| {
            md("Organization")
                .child(md("OrganizationName").attr_ns("xml:lang", XML_NS, "en").text(&org.name))
                .child(
                    md("OrganizationDisplayName")
                        .attr_ns("xml:lang", XML_NS, "en")
                        .text(&org.display_name),
                )
                .child(md("OrganizationURL").attr_ns("xml:lang", XML_NS, "en").text(&org.url))
        });
        let contacts = settings.contacts.iter().map(|contact| {
            let field = |name: &str, value: &Option<String>| {
                value.as_ref().map(|v| md(name).text(v))
            };
            md("ContactPerson")
                .attr("contactType", contact.contact_type.as_str())
                .child_opt(field("Company", &contact.company))
                .child_opt(field("GivenName", &contact.given_name))
                .child_opt(field("SurName", &contact.surname))
                .child_opt(field("EmailAddress", &contact.email))
                .child_opt(field("TelephoneNumber", &contact.telephone))
        });

        md("EntityDescriptor")
            .declare(prefixes::MD, MD_NS)
            .declare(prefixes::DS, XMLDSIG_NS)
            .declare(prefixes::SAML, SAML_NS)
            .attr("ID", id)
            .attr("entityID", &self.config.service_provider.id)
            .child(self.sp_sso_descriptor())
            .child_opt(organization)
            .children(contacts)
    }

    fn key_descriptor(&self, usage: &str) -> Element {
        let certificate = self.config.service_provider.credential.certificate();
        md("KeyDescriptor").attr("use", usage).child(
            ds("KeyInfo").child(
                ds("X509Data").child(ds("X509Certificate").text(certificate.to_base64())),
            ),
        )
    }

    fn sp_sso_descriptor(&self) -> Element {
        let sp = &self.config.service_provider;
        let settings = &self.config.metadata;
        let mut descriptor = md("SPSSODescriptor")
            .attr("AuthnRequestsSigned", "true")
            .attr("WantAssertionsSigned", settings.want_assertions_signed.to_string())
            .attr("protocolSupportEnumeration", SAMLP_NS)
            .child(self.key_descriptor("signing"))
            .child(self.key_descriptor("encryption"));

        let sign_on = || sp.endpoints.iter().filter(|e| e.kind == EndpointKind::SignOn);

        if settings.include_artifact_endpoints {
            for endpoint in sign_on() {
                descriptor = descriptor.child(
                    md("ArtifactResolutionService")
                        .attr("Binding", SamlBinding::Soap.uri())
                        .attr("Location", &endpoint.url)
                        .attr("index", endpoint.index.to_string())
                        .attr("isDefault", endpoint.is_default.to_string()),
                );
            }
        }

        for endpoint in sp.endpoints.iter().filter(|e| e.kind == EndpointKind::Logout) {
            let bindings = match endpoint.binding {
                Some(binding) => vec![binding],
                None if settings.include_artifact_endpoints => vec![
                    SamlBinding::Redirect,
                    SamlBinding::Post,
                    SamlBinding::Artifact,
                    SamlBinding::Soap,
                ],
                None => vec![SamlBinding::Redirect, SamlBinding::Post, SamlBinding::Soap],
            };
            for binding in bindings {
                descriptor = descriptor.child(
                    md("SingleLogoutService")
                        .attr("Binding", binding.uri())
                        .attr("Location", &endpoint.url)
                        .attr_opt("ResponseLocation", endpoint.redirect_url.as_deref()),
                );
            }
        }

        for format in &self.config.name_id_formats.formats {
            descriptor = descriptor.child(md("NameIDFormat").text(format.uri()));
        }

        for endpoint in sign_on() {
            let binding = endpoint.binding.unwrap_or(SamlBinding::Post);
            descriptor = descriptor.child(
                md("AssertionConsumerService")
                    .attr("Binding", binding.uri())
                    .attr("Location", &endpoint.url)
                    .attr("index", endpoint.index.to_string())
                    .attr("isDefault", endpoint.is_default.to_string()),
            );
        }

        if !settings.requested_attributes.is_empty() {
            let service_name = settings
                .organization
                .as_ref()
                .map_or(sp.id.as_str(), |org| org.display_name.as_str());
            descriptor = descriptor.child(
                md("AttributeConsumingService")
                    .attr("index", "0")
                    .attr("isDefault", "true")
                    .child(md("ServiceName").attr_ns("xml:lang", XML_NS, "en").text(service_name))
                    .children(settings.requested_attributes.iter().map(|attribute| {
                        md("RequestedAttribute")
                            .attr("Name", &attribute.name)
                            .attr(
                                "NameFormat",
                                "urn:oasis:names:tc:SAML:2.0:attrname-format:basic",
                            )
                            .attr("isRequired", attribute.required.to_string())
                    })),
            );
        }

        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Contact, IdentityProvider, Organization, RequestedAttribute, ServiceProvider,
        ServiceProviderEndpoint,
    };
    use crate::signature::{check_signature_with_keys, SigningCredential};
    use crate::types::NameIdFormat;

    const SP_KEY: &str = include_str!("../../testdata/sp.key.pem");
    const SP_CERT: &str = include_str!("../../testdata/sp.crt.pem");

    fn config() -> Configuration {
        let sp = ServiceProvider::new(
            "https://sp.example.com",
            SigningCredential::from_pem(SP_KEY, SP_CERT).unwrap(),
        )
        .with_endpoint(
            ServiceProviderEndpoint::new(EndpointKind::SignOn, "https://sp.example.com/acs")
                .with_index(1),
        )
        .with_endpoint(ServiceProviderEndpoint::new(
            EndpointKind::Logout,
            "https://sp.example.com/slo",
        ));
        let mut config = Configuration::new(sp, vec![IdentityProvider::new("idp1")]).unwrap();
        config.name_id_formats.formats = vec![NameIdFormat::Persistent];
        config.metadata.organization = Some(Organization {
            name: "Example".into(),
            display_name: "Example SP".into(),
            url: "https://example.com".into(),
        });
        config.metadata.contacts = vec![Contact {
            email: Some("ops@example.com".into()),
            ..Contact::default()
        }];
        config.metadata.requested_attributes = vec![RequestedAttribute {
            name: "mail".into(),
            required: true,
        }];
        config
    }

    #[test]
    fn utf8_metadata_is_signed_with_sp_key() {
        let config = config();
        let bytes = MetadataGenerator::new(&config)
            .generate(MetadataEncoding::Utf8)
            .unwrap();
        let xml = String::from_utf8(bytes).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));

        let doc = XmlDocument::parse(&xml).unwrap();
        let key = config.service_provider.credential.certificate().public_key().clone();
        assert!(check_signature_with_keys(&doc, &[key]));

        let descriptor = doc.root().find_child(MD_NS, "SPSSODescriptor").unwrap();
        assert_eq!(descriptor.attribute("WantAssertionsSigned"), Some("true"));
        assert_eq!(descriptor.find_children(MD_NS, "KeyDescriptor").count(), 2);
        assert_eq!(descriptor.find_children(MD_NS, "SingleLogoutService").count(), 4);
        let acs = descriptor.find_child(MD_NS, "AssertionConsumerService").unwrap();
        assert_eq!(acs.attribute("Binding"), Some(SamlBinding::Post.uri()));
        assert_eq!(acs.attribute("index"), Some("1"));
        let ars = descriptor.find_child(MD_NS, "ArtifactResolutionService").unwrap();
        assert_eq!(ars.attribute("Binding"), Some(SamlBinding::Soap.uri()));
        assert_eq!(
            descriptor.child_text(MD_NS, "NameIDFormat").as_deref(),
            Some(NameIdFormat::Persistent.uri())
        );
        assert!(doc.root().find_child(MD_NS, "Organization").is_some());
        assert!(xml.contains("ops@example.com"));
        assert!(xml.contains("RequestedAttribute"));
    }

    #[test]
    fn artifact_endpoints_can_be_excluded() {
        let mut config = config();
        config.metadata.include_artifact_endpoints = false;
        let xml = String::from_utf8(
            MetadataGenerator::new(&config)
                .generate(MetadataEncoding::Utf8)
                .unwrap(),
        )
        .unwrap();
        assert!(!xml.contains("ArtifactResolutionService"));
        assert!(!xml.contains(SamlBinding::Artifact.uri()));
    }

    #[test]
    fn utf16_metadata_has_bom() {
        let config = config();
        let bytes = MetadataGenerator::new(&config)
            .generate(MetadataEncoding::Utf16)
            .unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let xml = String::from_utf16(&units).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-16\"?>"));
        assert!(xml.contains("https://sp.example.com"));
    }
}
