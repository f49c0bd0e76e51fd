//! HTTP-Artifact binding in both directions.

use saml2_protocol::artifact::Artifact;
use saml2_protocol::bindings::{SoapBindingParser, SoapEnvelope, ARTIFACT_PARAM};
use saml2_protocol::protocol::{session_keys, InboundRequest, LoginHandler, SamlAction};
use saml2_protocol::{ArtifactResolve, SamlError, XMLDSIG_NS};

use crate::common::{
    self, expect_redirect, query_param, start_login, TestIdentityProvider, ACS_URL, IDP_ID,
    METADATA_IDENTITY_PROVIDER, SESSION, SP_ID,
};

/// The metadata identity provider, receiving requests by artifact.
const ARTIFACT_IDENTITY_PROVIDER: &str = r#"
[[identity_providers]]
metadata_file = "idp-metadata.xml"

[[identity_providers.endpoints]]
kind = "sign_on"
binding = "artifact"
url = "https://idp.example.com/sso/artifact"
"#;

fn artifact_request(artifact: &str) -> anyhow::Result<InboundRequest> {
    Ok(InboundRequest::get(&format!(
        "{ACS_URL}?{ARTIFACT_PARAM}={}&RelayState=app",
        urlencoding::encode(artifact)
    ))?)
}

/// What the identity provider receives when it resolves `artifact` at the SP.
fn resolve_at_sp(
    handler: &LoginHandler<'_>,
    idp: &TestIdentityProvider,
    artifact: &str,
) -> anyhow::Result<Result<SoapBindingParser, SamlError>> {
    let resolve = ArtifactResolve::new(IDP_ID, artifact).with_destination(ACS_URL);
    let signed = idp.signer().sign_element(resolve.to_element(), &resolve.id)?;
    let request = InboundRequest::soap(ACS_URL, SoapEnvelope::to_xml(signed))?;
    Ok(match handler.handle(&request, SESSION) {
        Ok(SamlAction::Soap(envelope)) => Ok(SoapBindingParser::from_xml(&envelope)?),
        Ok(other) => anyhow::bail!("expected a SOAP answer, got {other:?}"),
        Err(err) => Err(err),
    })
}

#[test]
fn response_artifact_is_resolved_and_consumed() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let state = common::state(METADATA_IDENTITY_PROVIDER, &idp)?;
    let request_id = start_login(&state, &idp)?;

    let artifact = idp.issue_artifact(idp.response(Some(&request_id))?)?;
    let action = LoginHandler::new(&state).handle(&artifact_request(&artifact)?, SESSION)?;
    let SamlAction::Authenticated(session) = action else {
        anyhow::bail!("expected a login, got {action:?}");
    };
    assert_eq!(session.idp, IDP_ID);
    assert_eq!(session.name_id.value, "alice");
    assert_eq!(session.relay_state.as_deref(), Some("app"));

    // The identity provider hands out each message once.
    let again = LoginHandler::new(&state).handle(&artifact_request(&artifact)?, SESSION);
    assert!(matches!(again, Err(SamlError::Security(_))));
    Ok(())
}

#[test]
fn artifact_from_unknown_source_is_rejected() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let state = common::state(METADATA_IDENTITY_PROVIDER, &idp)?;
    let artifact = Artifact::new(0, "https://elsewhere.example.com").encode();

    let result = LoginHandler::new(&state).handle(&artifact_request(&artifact)?, SESSION);
    assert!(matches!(result, Err(SamlError::InvalidOperation(_))));
    Ok(())
}

#[test]
fn request_artifact_is_resolved_once_by_identity_provider() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let state = common::state(ARTIFACT_IDENTITY_PROVIDER, &idp)?;
    let handler = LoginHandler::new(&state);

    let request = InboundRequest::get(&format!("{ACS_URL}?RelayState=app"))?;
    let url = expect_redirect(handler.handle(&request, SESSION)?)?;
    assert!(url.starts_with("https://idp.example.com/sso/artifact?SAMLart="));
    assert_eq!(query_param(&url, "RelayState")?.as_deref(), Some("app"));
    let artifact = query_param(&url, ARTIFACT_PARAM)?
        .ok_or_else(|| anyhow::anyhow!("no artifact in {url}"))?;
    assert!(Artifact::parse(&artifact)?.is_from(SP_ID));

    let parser = resolve_at_sp(&handler, &idp, &artifact)??;
    assert!(parser.is_artifact_response());
    assert!(parser.check_saml_message_signature(idp.sp_keys()));
    let response = parser.artifact_response()?;
    assert_eq!(response.issuer, SP_ID);
    let message = response
        .message
        .ok_or_else(|| anyhow::anyhow!("artifact resolved to nothing"))?;
    assert_eq!(message.name, "AuthnRequest");
    assert!(message.find_child(XMLDSIG_NS, "Signature").is_some());
    let pending = state
        .sessions()
        .get(SESSION, session_keys::PENDING_AUTHN_REQUEST)?;
    assert_eq!(message.id(), pending.as_deref());

    let second = resolve_at_sp(&handler, &idp, &artifact)??.artifact_response()?;
    assert!(second.status.is_success());
    assert!(second.message.is_none());
    Ok(())
}

#[test]
fn artifact_resolve_must_be_signed_by_identity_provider() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let state = common::state(ARTIFACT_IDENTITY_PROVIDER, &idp)?;
    let handler = LoginHandler::new(&state);

    let request = InboundRequest::get(ACS_URL)?;
    let url = expect_redirect(handler.handle(&request, SESSION)?)?;
    let artifact = query_param(&url, ARTIFACT_PARAM)?
        .ok_or_else(|| anyhow::anyhow!("no artifact in {url}"))?;

    let config = state.config().current();
    let resolve = ArtifactResolve::new(IDP_ID, artifact.as_str());
    let forged = config.signer().sign_element(resolve.to_element(), &resolve.id)?;
    let request = InboundRequest::soap(ACS_URL, SoapEnvelope::to_xml(forged))?;
    assert!(matches!(
        handler.handle(&request, SESSION),
        Err(SamlError::Security(_))
    ));

    // The artifact survives the rejected attempt.
    assert!(resolve_at_sp(&handler, &idp, &artifact)??.artifact_response()?.message.is_some());
    Ok(())
}
