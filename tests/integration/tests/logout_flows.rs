//! Single Logout initiated by either side.

use saml2_protocol::bindings::{RedirectBindingParser, SoapBindingParser, SoapEnvelope};
use saml2_protocol::protocol::{session_keys, InboundRequest, LogoutHandler, SamlAction};
use saml2_protocol::{LogoutRequest, LogoutResponse, NameId};

use crate::common::{
    self, expect_redirect, log_in, post_encode, TestIdentityProvider, GOODBYE_URL, IDP_ID,
    METADATA_IDENTITY_PROVIDER, SESSION, SLO_URL, SP_ID,
};

/// The metadata identity provider, logging out over SOAP.
const SOAP_LOGOUT_IDENTITY_PROVIDER: &str = r#"
[[identity_providers]]
metadata_file = "idp-metadata.xml"

[[identity_providers.endpoints]]
kind = "logout"
binding = "soap"
"#;

fn logout_request_from_idp() -> LogoutRequest {
    LogoutRequest::new(IDP_ID, NameId::new("alice"))
        .with_destination(SLO_URL)
        .with_session_index("idx-7")
}

#[test]
fn sp_initiated_logout_over_redirect_and_post() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let state = common::state(METADATA_IDENTITY_PROVIDER, &idp)?;
    log_in(&state, &idp)?;
    let handler = LogoutHandler::new(&state);

    let url = expect_redirect(handler.initiate(SESSION, Some("bye"))?)?;
    assert!(url.starts_with("https://idp.example.com/slo?SAMLRequest="));
    let parser = RedirectBindingParser::from_url(&url)?;
    assert!(parser.verify_signature(idp.sp_keys()));
    let request = LogoutRequest::from_element(parser.document().root())?;
    assert_eq!(request.issuer, SP_ID);
    assert_eq!(request.name_id.value, "alice");
    assert_eq!(request.session_indexes, ["idx-7"]);
    assert_eq!(request.reason.as_deref(), Some(LogoutRequest::REASON_USER));

    // The session lasts until the identity provider answers.
    assert!(state.sessions().get(SESSION, session_keys::IDP)?.is_some());

    let response = LogoutResponse::success(IDP_ID, &request.id).with_destination(SLO_URL);
    let signed = idp.signer().sign_element(response.to_element(), &response.id)?;
    let posted = InboundRequest::post_form(
        SLO_URL,
        [
            ("SAMLResponse", post_encode(&signed.to_xml())),
            ("RelayState", "bye".to_string()),
        ],
    )?;
    let action = handler.handle(&posted, SESSION)?;
    let SamlAction::LoggedOut { redirect_url } = action else {
        anyhow::bail!("expected a logout, got {action:?}");
    };
    assert_eq!(redirect_url.as_deref(), Some(GOODBYE_URL));
    assert_eq!(state.sessions().get(SESSION, session_keys::IDP)?, None);
    Ok(())
}

#[test]
fn sp_initiated_logout_over_soap_completes_in_one_call() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let state = common::state(SOAP_LOGOUT_IDENTITY_PROVIDER, &idp)?;
    log_in(&state, &idp)?;

    let action = LogoutHandler::new(&state).initiate(SESSION, None)?;
    assert!(matches!(action, SamlAction::LoggedOut { .. }));
    assert_eq!(state.sessions().get(SESSION, session_keys::NAME_ID)?, None);
    Ok(())
}

#[test]
fn idp_initiated_logout_over_post() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let state = common::state(METADATA_IDENTITY_PROVIDER, &idp)?;
    log_in(&state, &idp)?;

    let request = logout_request_from_idp();
    let signed = idp.signer().sign_element(request.to_element(), &request.id)?;
    let posted = InboundRequest::post_form(
        SLO_URL,
        [
            ("SAMLRequest", post_encode(&signed.to_xml())),
            ("RelayState", "idp-state".to_string()),
        ],
    )?;
    let url = expect_redirect(LogoutHandler::new(&state).handle(&posted, SESSION)?)?;
    assert_eq!(state.sessions().get(SESSION, session_keys::IDP)?, None);

    assert!(url.starts_with("https://idp.example.com/slo?SAMLResponse="));
    let parser = RedirectBindingParser::from_url(&url)?;
    assert!(parser.verify_signature(idp.sp_keys()));
    assert_eq!(parser.relay_state(), Some("idp-state"));
    let response = LogoutResponse::from_element(parser.document().root())?;
    assert!(response.is_success());
    assert_eq!(response.in_response_to.as_deref(), Some(request.id.as_str()));
    Ok(())
}

#[test]
fn idp_initiated_logout_over_soap() -> anyhow::Result<()> {
    let idp = TestIdentityProvider::new()?;
    let state = common::state(METADATA_IDENTITY_PROVIDER, &idp)?;

    let request = logout_request_from_idp();
    let signed = idp.signer().sign_element(request.to_element(), &request.id)?;
    let inbound = InboundRequest::soap(SLO_URL, SoapEnvelope::to_xml(signed))?;
    let action = LogoutHandler::new(&state).handle(&inbound, "back-channel")?;
    let SamlAction::BackChannelLogout {
        name_id,
        session_indexes,
        envelope,
    } = action
    else {
        anyhow::bail!("expected a back-channel logout, got {action:?}");
    };
    assert_eq!(name_id.value, "alice");
    assert_eq!(session_indexes, ["idx-7"]);

    let answer = SoapBindingParser::from_xml(&envelope)?;
    assert!(answer.check_saml_message_signature(idp.sp_keys()));
    let response = answer.logout_response()?;
    assert!(response.is_success());
    assert_eq!(response.in_response_to.as_deref(), Some(request.id.as_str()));
    Ok(())
}
