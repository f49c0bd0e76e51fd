//! Test fixtures: one SP, the identity provider of `testdata/idp-metadata.xml`
//! and responses it would send.

use base64::Engine;
use chrono::{Duration, SecondsFormat, Utc};

use super::SamlState;
use crate::config::{
    Configuration, ConfigurationHandle, EndpointKind, IdentityProvider, ServiceProvider,
    ServiceProviderEndpoint,
};
use crate::metadata::EntityMetadata;
use crate::signature::{SigningCredential, XmlSigner};
use crate::types::SamlBinding;

pub const SP_ID: &str = "https://sp.example.com";
pub const IDP_ID: &str = "https://idp.example.com";
pub const ACS_URL: &str = "https://sp.example.com/acs";
pub const HOME_URL: &str = "https://sp.example.com/home";
pub const ASSERTION_ID: &str = "_a7f3b0a6c2d9e4f18a5b1c0d2e3f4051";
pub const RESPONSE_ID: &str = "_r7f3b0a6c2d9e4f18a5b1c0d2e3f4051";

const SP_KEY: &str = include_str!("../../testdata/sp.key.pem");
const SP_CERT: &str = include_str!("../../testdata/sp.crt.pem");
const IDP_KEY: &str = include_str!("../../testdata/idp.key.pem");
const IDP_CERT: &str = include_str!("../../testdata/idp.crt.pem");
const METADATA: &str = include_str!("../../testdata/idp-metadata.xml");

pub fn sp_credential() -> SigningCredential {
    SigningCredential::from_pem(SP_KEY, SP_CERT).unwrap()
}

pub fn idp_credential() -> SigningCredential {
    SigningCredential::from_pem(IDP_KEY, IDP_CERT).unwrap()
}

pub fn identity_provider() -> IdentityProvider {
    IdentityProvider::from_metadata(EntityMetadata::parse(METADATA).unwrap())
}

pub fn configuration(idp: IdentityProvider) -> Configuration {
    let sp = ServiceProvider::new(SP_ID, sp_credential())
        .with_endpoint(
            ServiceProviderEndpoint::new(EndpointKind::SignOn, ACS_URL)
                .with_binding(SamlBinding::Post)
                .with_redirect_url(HOME_URL),
        )
        .with_endpoint(ServiceProviderEndpoint::new(
            EndpointKind::Logout,
            "https://sp.example.com/slo",
        ));
    Configuration::new(sp, vec![idp])
        .unwrap()
        .with_allowed_audiences([SP_ID])
}

pub fn state(idp: IdentityProvider) -> SamlState {
    SamlState::in_memory(ConfigurationHandle::new(configuration(idp)))
}

/// Which part of a response the identity provider signs.
#[derive(Clone, Copy)]
pub enum Signed {
    Assertion,
    Response,
    Nothing,
}

fn instant(offset: Duration) -> String {
    (Utc::now() + offset).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A successful response about `name_id`, serialized.
pub fn response_xml(in_response_to: Option<&str>, signed: Signed) -> String {
    let now = instant(Duration::zero());
    let not_before = instant(Duration::minutes(-1));
    let not_on_or_after = instant(Duration::minutes(5));
    let in_response_to = in_response_to
        .map(|id| format!(r#" InResponseTo="{id}""#))
        .unwrap_or_default();
    let xml = format!(
        r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{RESPONSE_ID}" Version="2.0" IssueInstant="{now}" Destination="{ACS_URL}"{in_response_to}><saml:Issuer>{IDP_ID}</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status><saml:Assertion ID="{ASSERTION_ID}" Version="2.0" IssueInstant="{now}"><saml:Issuer>{IDP_ID}</saml:Issuer><saml:Subject><saml:NameID Format="urn:oasis:names:tc:SAML:2.0:nameid-format:persistent">alice-0001</saml:NameID><saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer"><saml:SubjectConfirmationData NotOnOrAfter="{not_on_or_after}" Recipient="{ACS_URL}"/></saml:SubjectConfirmation></saml:Subject><saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}"><saml:AudienceRestriction><saml:Audience>{SP_ID}</saml:Audience></saml:AudienceRestriction></saml:Conditions><saml:AuthnStatement AuthnInstant="{now}" SessionIndex="s-42"><saml:AuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport</saml:AuthnContextClassRef></saml:AuthnContext></saml:AuthnStatement><saml:AttributeStatement><saml:Attribute Name="mail"><saml:AttributeValue>alice@example.com</saml:AttributeValue></saml:Attribute></saml:AttributeStatement></saml:Assertion></samlp:Response>"#
    );
    let credential = idp_credential();
    let signer = XmlSigner::new(&credential);
    match signed {
        Signed::Assertion => signer.sign(&xml, ASSERTION_ID).unwrap(),
        Signed::Response => signer.sign(&xml, RESPONSE_ID).unwrap(),
        Signed::Nothing => xml,
    }
}

/// A `NoPassive` error response.
pub fn no_passive_xml(in_response_to: &str) -> String {
    format!(
        r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{RESPONSE_ID}" Version="2.0" IssueInstant="{}" InResponseTo="{in_response_to}"><saml:Issuer>{IDP_ID}</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Responder"><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:NoPassive"/></samlp:StatusCode></samlp:Status></samlp:Response>"#,
        instant(Duration::zero())
    )
}

pub fn post_encode(xml: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(xml)
}
