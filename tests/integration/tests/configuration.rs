//! Configuration loading and SP metadata publication.

use std::time::Duration;

use saml2_protocol::config::Configuration;
use saml2_protocol::extensions::ExtensionRegistry;
use saml2_protocol::metadata::{MetadataEncoding, MetadataGenerator};
use saml2_protocol::signature::{check_signature_with_keys, SignatureAlgorithm};
use saml2_protocol::xml::XmlDocument;
use saml2_protocol::{NameIdFormat, SamlBinding, SamlError, MD_NS};

use crate::common::{self, TestIdentityProvider, ACS_URL, IDP_ID, SP_ID};

#[test]
fn configuration_file_resolves_relative_paths() -> anyhow::Result<()> {
    common::init_tracing();
    let config = Configuration::from_file(
        common::testdata().join("saml2.toml"),
        &ExtensionRegistry::new(),
    )?;

    assert_eq!(config.service_provider.id, SP_ID);
    assert_eq!(config.allowed_audiences, [SP_ID]);
    assert_eq!(config.clock_skew, Duration::from_secs(120));
    assert_eq!(config.artifact_lifetime, Duration::from_secs(60));
    assert_eq!(config.signature_algorithm, SignatureAlgorithm::RsaSha256);
    assert_eq!(config.name_id_formats.formats, [NameIdFormat::Persistent]);
    assert_eq!(config.name_id_formats.allow_create, Some(true));

    let idp = config.require_identity_provider(IDP_ID)?;
    assert_eq!(idp.name, "Example IdP");
    assert!(idp.has_metadata());
    assert!(idp.allow_idp_initiated_sso);
    assert!(!idp.allow_replay);
    assert_eq!(config.identity_provider_keys(idp).len(), 1);
    Ok(())
}

#[test]
fn unreadable_credential_is_a_configuration_error() {
    let toml = common::SERVICE_PROVIDER.replace("sp.key.pem", "missing.key.pem");
    let result = Configuration::from_toml_str(&toml, &common::testdata(), &ExtensionRegistry::new());
    assert!(matches!(result, Err(SamlError::Configuration(_))));
}

#[test]
fn duplicate_identity_providers_are_rejected() {
    let twice = format!(
        "{}{}",
        common::METADATA_IDENTITY_PROVIDER,
        common::METADATA_IDENTITY_PROVIDER
    );
    let err = common::configuration(&twice).expect_err("duplicate identity provider ids");
    assert!(matches!(
        err.downcast_ref::<SamlError>(),
        Some(SamlError::Configuration(_))
    ));
}

#[test]
fn unknown_extension_is_a_configuration_error() {
    let toml = format!(
        "{}assertion_check = \"no-such-check\"\n",
        common::METADATA_IDENTITY_PROVIDER
    );
    assert!(common::configuration(&toml).is_err());
}

#[test]
fn published_metadata_is_signed_by_the_sp() -> anyhow::Result<()> {
    common::init_tracing();
    let config = Configuration::from_file(
        common::testdata().join("saml2.toml"),
        &ExtensionRegistry::new(),
    )?;
    let idp = TestIdentityProvider::new()?;

    let xml = String::from_utf8(MetadataGenerator::new(&config).generate(MetadataEncoding::Utf8)?)?;
    let doc = XmlDocument::parse(&xml)?;
    assert!(check_signature_with_keys(&doc, idp.sp_keys()));

    let root = doc.root();
    assert!(root.is(MD_NS, "EntityDescriptor"));
    assert_eq!(root.attribute("entityID"), Some(SP_ID));
    let descriptor = root
        .find_child(MD_NS, "SPSSODescriptor")
        .ok_or_else(|| anyhow::anyhow!("no SPSSODescriptor"))?;
    let acs = descriptor
        .find_children(MD_NS, "AssertionConsumerService")
        .find(|acs| acs.attribute("Binding") == Some(SamlBinding::Post.uri()))
        .ok_or_else(|| anyhow::anyhow!("no POST assertion consumer service"))?;
    assert_eq!(acs.attribute("Location"), Some(ACS_URL));
    assert!(xml.contains("saml-admin@example.com"));
    Ok(())
}
