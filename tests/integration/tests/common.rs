//! Common test utilities and fixtures.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{SecondsFormat, TimeDelta, Utc};
use saml2_cache::{ArtifactStore, InMemoryArtifactStore};
use saml2_protocol::artifact::Artifact;
use saml2_protocol::bindings::{RedirectBindingParser, SoapBindingParser, SoapClient, SoapEnvelope};
use saml2_protocol::config::{ArtifactResolutionSettings, Configuration, ConfigurationHandle};
use saml2_protocol::extensions::ExtensionRegistry;
use saml2_protocol::protocol::{InboundRequest, LoginHandler, SamlAction, SamlState};
use saml2_protocol::signature::{SigningCredential, VerificationKey, XmlSigner};
use saml2_protocol::xml::XmlDocument;
use saml2_protocol::{ArtifactResponse, LogoutResponse, SamlError, SamlResult};

pub const SP_ID: &str = "https://sp.example.com";
pub const IDP_ID: &str = "https://idp.example.com";
pub const ACS_URL: &str = "https://sp.example.com/acs";
pub const SLO_URL: &str = "https://sp.example.com/slo";
pub const HOME_URL: &str = "https://sp.example.com/home";
pub const GOODBYE_URL: &str = "https://sp.example.com/goodbye";

/// Browser session of the principal.
pub const SESSION: &str = "browser-1";

/// The service provider of every test.
pub const SERVICE_PROVIDER: &str = r#"
allowed_audiences = ["https://sp.example.com"]
clock_skew_secs = 60

[service_provider]
id = "https://sp.example.com"
signing_key = "sp.key.pem"
signing_certificate = "sp.crt.pem"

[[service_provider.endpoints]]
kind = "sign_on"
url = "https://sp.example.com/acs"
binding = "post"
redirect_url = "https://sp.example.com/home"

[[service_provider.endpoints]]
kind = "logout"
url = "https://sp.example.com/slo"
redirect_url = "https://sp.example.com/goodbye"
"#;

/// The identity provider described by `idp-metadata.xml`.
pub const METADATA_IDENTITY_PROVIDER: &str = r#"
[[identity_providers]]
metadata_file = "idp-metadata.xml"
"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("saml2_protocol=debug")
        .with_test_writer()
        .try_init();
}

/// Directory with keys, certificates and metadata.
pub fn testdata() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../crates/saml2-protocol/testdata")
}

pub fn read_testdata(name: &str) -> anyhow::Result<String> {
    Ok(std::fs::read_to_string(testdata().join(name))?)
}

/// Loads the service provider with `identity_providers` appended.
pub fn configuration(identity_providers: &str) -> anyhow::Result<Configuration> {
    let toml = format!("{SERVICE_PROVIDER}{identity_providers}");
    Ok(Configuration::from_toml_str(
        &toml,
        &testdata(),
        &ExtensionRegistry::new(),
    )?)
}

/// Protocol state whose back channel reaches `idp`.
pub fn state(identity_providers: &str, idp: &Arc<TestIdentityProvider>) -> anyhow::Result<SamlState> {
    init_tracing();
    let config = configuration(identity_providers)?;
    Ok(SamlState::in_memory(ConfigurationHandle::new(config))
        .with_soap_client(Arc::clone(idp) as Arc<dyn SoapClient>))
}

pub fn post_encode(xml: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(xml)
}

pub fn expect_redirect(action: SamlAction) -> anyhow::Result<String> {
    match action {
        SamlAction::Redirect(url) => Ok(url),
        other => anyhow::bail!("expected a redirect, got {other:?}"),
    }
}

/// Starts a login at a Redirect sign-on endpoint and returns the ID of the
/// request the identity provider received.
pub fn start_login(state: &SamlState, idp: &TestIdentityProvider) -> anyhow::Result<String> {
    let request = InboundRequest::get(&format!("{ACS_URL}?RelayState=app"))?;
    let url = expect_redirect(LoginHandler::new(state).handle(&request, SESSION)?)?;
    let parser = RedirectBindingParser::from_url(&url)?;
    anyhow::ensure!(parser.verify_signature(idp.sp_keys()), "request signature");
    Ok(parser.document().root().id().unwrap_or_default().to_string())
}

/// Logs `SESSION` in at the metadata identity provider.
pub fn log_in(state: &SamlState, idp: &TestIdentityProvider) -> anyhow::Result<()> {
    let request_id = start_login(state, idp)?;
    let posted = post_response(&idp.response(Some(&request_id))?, "app")?;
    match LoginHandler::new(state).handle(&posted, SESSION)? {
        SamlAction::Authenticated(_) => Ok(()),
        other => anyhow::bail!("expected a login, got {other:?}"),
    }
}

/// A POSTed `SAMLResponse` at the assertion consumer service.
pub fn post_response(xml: &str, relay_state: &str) -> anyhow::Result<InboundRequest> {
    Ok(InboundRequest::post_form(
        ACS_URL,
        [("SAMLResponse", post_encode(xml)), ("RelayState", relay_state.to_string())],
    )?)
}

/// Value of query parameter `name` in `url`.
pub fn query_param(url: &str, name: &str) -> anyhow::Result<Option<String>> {
    let url = url::Url::parse(url)?;
    Ok(url
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned()))
}

/// The identity provider side of the exchanges.
///
/// Signs with the `idp` credential, trusts the SP certificate, and answers
/// back-channel calls the way a conforming identity provider would.
pub struct TestIdentityProvider {
    credential: SigningCredential,
    sp_key: VerificationKey,
    artifacts: InMemoryArtifactStore,
}

impl TestIdentityProvider {
    pub fn new() -> anyhow::Result<Arc<Self>> {
        let credential =
            SigningCredential::from_pem(&read_testdata("idp.key.pem")?, &read_testdata("idp.crt.pem")?)?;
        let sp = SigningCredential::from_pem(&read_testdata("sp.key.pem")?, &read_testdata("sp.crt.pem")?)?;
        Ok(Arc::new(Self {
            credential,
            sp_key: sp.certificate().public_key().clone(),
            artifacts: InMemoryArtifactStore::new(),
        }))
    }

    pub fn signer(&self) -> XmlSigner<'_> {
        XmlSigner::new(&self.credential)
    }

    /// Keys that verify the service provider's signatures.
    pub fn sp_keys(&self) -> &[VerificationKey] {
        std::slice::from_ref(&self.sp_key)
    }

    /// A successful response for `alice` with a signed assertion.
    pub fn response(&self, in_response_to: Option<&str>) -> anyhow::Result<String> {
        let instant = |offset: TimeDelta| (Utc::now() + offset).to_rfc3339_opts(SecondsFormat::Secs, true);
        let now = instant(TimeDelta::zero());
        let not_before = instant(TimeDelta::minutes(-1));
        let not_on_or_after = instant(TimeDelta::minutes(5));
        let in_response_to = in_response_to
            .map(|id| format!(r#" InResponseTo="{id}""#))
            .unwrap_or_default();
        let assertion_id = saml2_crypto::generate_message_id();
        let response_id = saml2_crypto::generate_message_id();
        let xml = format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{response_id}" Version="2.0" IssueInstant="{now}" Destination="{ACS_URL}"{in_response_to}><saml:Issuer>{IDP_ID}</saml:Issuer><samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status><saml:Assertion ID="{assertion_id}" Version="2.0" IssueInstant="{now}"><saml:Issuer>{IDP_ID}</saml:Issuer><saml:Subject><saml:NameID Format="urn:oasis:names:tc:SAML:2.0:nameid-format:persistent">alice</saml:NameID><saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer"><saml:SubjectConfirmationData NotOnOrAfter="{not_on_or_after}" Recipient="{ACS_URL}"/></saml:SubjectConfirmation></saml:Subject><saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}"><saml:AudienceRestriction><saml:Audience>{SP_ID}</saml:Audience></saml:AudienceRestriction></saml:Conditions><saml:AuthnStatement AuthnInstant="{now}" SessionIndex="idx-7"><saml:AuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport</saml:AuthnContextClassRef></saml:AuthnContext></saml:AuthnStatement><saml:AttributeStatement><saml:Attribute Name="displayName"><saml:AttributeValue>Alice</saml:AttributeValue></saml:Attribute></saml:AttributeStatement></saml:Assertion></samlp:Response>"#
        );
        Ok(self.signer().sign(&xml, &assertion_id)?)
    }

    /// Stores `message` and returns the artifact standing for it.
    pub fn issue_artifact(&self, message: String) -> anyhow::Result<String> {
        let artifact = Artifact::new(0, IDP_ID).encode();
        self.artifacts
            .insert(&artifact, message, Duration::from_secs(60))?;
        Ok(artifact)
    }

    fn answer(&self, parser: &SoapBindingParser) -> SamlResult<String> {
        if !parser.check_saml_message_signature(self.sp_keys()) {
            return Err(SamlError::Security(format!(
                "{} is not signed by the service provider",
                parser.message().name
            )));
        }

        if parser.is_artifact_resolve() {
            let resolve = parser.artifact_resolve()?;
            let message = self
                .artifacts
                .take(&resolve.artifact)?
                .map(|xml| XmlDocument::parse(&xml).map(XmlDocument::into_root))
                .transpose()?;
            let response = ArtifactResponse::success(IDP_ID, &resolve.id, message);
            let signed = self.signer().sign_element(response.to_element(), &response.id)?;
            return Ok(SoapEnvelope::to_xml(signed));
        }

        if parser.is_logout_request() {
            let request = parser.logout_request()?;
            let response = LogoutResponse::success(IDP_ID, &request.id);
            let signed = self.signer().sign_element(response.to_element(), &response.id)?;
            return Ok(SoapEnvelope::to_xml(signed));
        }

        Err(SamlError::InvalidOperation(format!(
            "identity provider cannot answer {}",
            parser.message().name
        )))
    }
}

impl SoapClient for TestIdentityProvider {
    fn send(
        &self,
        url: &str,
        envelope: &str,
        _credentials: &ArtifactResolutionSettings,
    ) -> SamlResult<Vec<u8>> {
        if !url.starts_with(IDP_ID) {
            return Err(SamlError::Transport(format!("unexpected destination {url}")));
        }
        let parser = SoapBindingParser::from_xml(envelope)?;
        self.answer(&parser).map(String::into_bytes)
    }
}
