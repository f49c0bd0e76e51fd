//! Web Browser SSO over the Redirect and POST bindings.

use saml2_protocol::bindings::{RedirectBindingBuilder, RedirectBindingParser};
use saml2_protocol::config::ConfigurationHandle;
use saml2_protocol::protocol::{session_keys, InboundRequest, LoginHandler, SamlAction, SamlState};
use saml2_protocol::{AuthnRequest, SamlError};

use crate::common::{
    self, expect_redirect, post_response, start_login, TestIdentityProvider, ACS_URL, HOME_URL,
    IDP_ID, METADATA_IDENTITY_PROVIDER, SESSION,
};

/// An identity provider known only by ID, with a configured Redirect
/// sign-on endpoint.
const BARE_IDENTITY_PROVIDER: &str = r#"
[[identity_providers]]
id = "idp1"
default = true

[[identity_providers.endpoints]]
kind = "sign_on"
binding = "redirect"
url = "https://idp/sso"
"#;

#[test]
fn redirect_binding_carries_the_signed_request_unchanged() -> anyhow::Result<()> {
    common::init_tracing();
    let config = common::configuration(BARE_IDENTITY_PROVIDER)?;
    let idp = TestIdentityProvider::new()?;

    let original = AuthnRequest::new(&config.service_provider.id)
        .with_destination("https://idp/sso")
        .with_acs_url(ACS_URL)
        .to_xml();
    let url = RedirectBindingBuilder::new()
        .with_request(original.clone())?
        .with_relay_state("app")
        .with_signer(config.signer())
        .to_url("https://idp/sso")?;
    assert!(url.starts_with("https://idp/sso?SAMLRequest="));

    let parser = RedirectBindingParser::from_url(&url)?;
    assert!(parser.is_signed());
    assert!(parser.verify_signature(idp.sp_keys()));
    assert_eq!(parser.message(), original);
    assert_eq!(parser.relay_state(), Some("app"));

    let tampered = RedirectBindingParser::from_url(&url.replace("RelayState=app", "RelayState=evil"))?;
    assert!(!tampered.verify_signature(idp.sp_keys()));
    Ok(())
}

#[test]
fn login_at_configured_endpoint_sends_signed_request() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let state = common::state(BARE_IDENTITY_PROVIDER, &idp)?;

    let request = InboundRequest::get("https://sp.example.com/acs?RelayState=app")?;
    let url = expect_redirect(LoginHandler::new(&state).handle(&request, SESSION)?)?;
    assert!(url.starts_with("https://idp/sso?SAMLRequest="));

    let parser = RedirectBindingParser::from_url(&url)?;
    assert!(parser.verify_signature(idp.sp_keys()));
    assert_eq!(parser.relay_state(), Some("app"));
    let root = parser.document().root();
    assert_eq!(root.name, "AuthnRequest");
    assert_eq!(root.attribute("Destination"), Some("https://idp/sso"));
    assert_eq!(root.attribute("AssertionConsumerServiceURL"), Some(ACS_URL));

    let pending = state
        .sessions()
        .get(SESSION, session_keys::PENDING_AUTHN_REQUEST)?;
    assert_eq!(pending.as_deref(), root.id());
    Ok(())
}

#[test]
fn posted_response_completes_login() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let state = common::state(METADATA_IDENTITY_PROVIDER, &idp)?;
    let request_id = start_login(&state, &idp)?;

    let response = idp.response(Some(&request_id))?;
    let action = LoginHandler::new(&state).handle(&post_response(&response, "app")?, SESSION)?;
    let SamlAction::Authenticated(session) = action else {
        anyhow::bail!("expected a login, got {action:?}");
    };

    assert_eq!(session.idp, IDP_ID);
    assert_eq!(session.name_id.value, "alice");
    assert_eq!(session.identity, "alice");
    assert_eq!(session.session_index.as_deref(), Some("idx-7"));
    assert_eq!(session.relay_state.as_deref(), Some("app"));
    assert_eq!(session.redirect_url.as_deref(), Some(HOME_URL));
    assert!(session.attributes.iter().any(|a| a.name == "displayName"));

    let sessions = state.sessions();
    assert_eq!(sessions.get(SESSION, session_keys::IDP)?.as_deref(), Some(IDP_ID));
    assert_eq!(sessions.get(SESSION, session_keys::NAME_ID)?.as_deref(), Some("alice"));
    assert_eq!(sessions.get(SESSION, session_keys::PENDING_AUTHN_REQUEST)?, None);
    Ok(())
}

#[test]
fn response_cannot_be_replayed() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let state = common::state(METADATA_IDENTITY_PROVIDER, &idp)?;
    let request_id = start_login(&state, &idp)?;

    let posted = post_response(&idp.response(Some(&request_id))?, "app")?;
    LoginHandler::new(&state).handle(&posted, SESSION)?;

    let replayed = LoginHandler::new(&state).handle(&posted, SESSION);
    assert!(matches!(replayed, Err(SamlError::Security(_))));
    Ok(())
}

#[test]
fn response_for_another_request_is_rejected() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let state = common::state(METADATA_IDENTITY_PROVIDER, &idp)?;
    start_login(&state, &idp)?;

    let posted = post_response(&idp.response(Some("id-of-someone-else"))?, "app")?;
    let result = LoginHandler::new(&state).handle(&posted, SESSION);
    assert!(matches!(result, Err(SamlError::Security(_))));
    Ok(())
}

#[test]
fn unsolicited_response_needs_permission() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let response = idp.response(None)?;

    let strict = common::state(METADATA_IDENTITY_PROVIDER, &idp)?;
    let result = LoginHandler::new(&strict).handle(&post_response(&response, "app")?, SESSION);
    assert!(matches!(result, Err(SamlError::Security(_))));

    let permissive = common::state(
        &format!("{METADATA_IDENTITY_PROVIDER}allow_idp_initiated_sso = true\n"),
        &idp,
    )?;
    let action = LoginHandler::new(&permissive).handle(&post_response(&response, "app")?, SESSION)?;
    assert!(matches!(action, SamlAction::Authenticated(_)));
    Ok(())
}

#[test]
fn replaced_configuration_applies_to_next_request() -> anyhow::Result<()> {
    common::init_tracing();
    let handle = ConfigurationHandle::new(common::configuration(BARE_IDENTITY_PROVIDER)?);
    let state = SamlState::in_memory(handle);
    let request = InboundRequest::get(ACS_URL)?;

    let url = expect_redirect(LoginHandler::new(&state).handle(&request, SESSION)?)?;
    assert!(url.starts_with("https://idp/sso?"));

    state
        .config()
        .replace(common::configuration(METADATA_IDENTITY_PROVIDER)?)?;
    let url = expect_redirect(LoginHandler::new(&state).handle(&request, SESSION)?)?;
    assert!(url.starts_with("https://idp.example.com/sso?"));
    Ok(())
}
