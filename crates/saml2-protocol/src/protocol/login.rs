//! Web Browser SSO.

use super::consumer::{answer_artifact_resolve, resolve_artifact, ResponseConsumer, ResponseOutcome};
use super::http::HttpRequest;
use super::{redirect_url, send_front_channel, session_keys, AuthenticatedSession, SamlAction, SamlState};
use crate::bindings::{PostBindingParser, SamlMessageType, SoapBindingParser, ARTIFACT_PARAM};
use crate::config::{Configuration, EndpointKind};
use crate::error::{SamlError, SamlResult};
use crate::selection::{select_identity_provider, sign_on_endpoint, IdentityProviderSelection};
use crate::types::{AuthnRequest, NameIdPolicy, SamlBinding};
use crate::xml::Element;

const RELAY_STATE: &str = "RelayState";

/// Handles requests to the SP sign-on endpoint.
///
/// One endpoint serves every inbound leg of the profile:
///
/// - a SOAP `ArtifactResolve` from an identity provider fetching our
///   `AuthnRequest`
/// - a `SAMLart` artifact standing for the identity provider's response
/// - a POSTed `SAMLResponse`
/// - anything else starts a login at the selected identity provider
pub struct LoginHandler<'s> {
    state: &'s SamlState,
}

impl<'s> LoginHandler<'s> {
    /// Creates a handler over shared state.
    pub fn new(state: &'s SamlState) -> Self {
        Self { state }
    }

    /// Handles one request for the session `session_id`.
    pub fn handle(&self, request: &dyn HttpRequest, session_id: &str) -> SamlResult<SamlAction> {
        let config = self.state.config().current();

        if request.is_soap() {
            let parser = SoapBindingParser::from_bytes(request.body())?;
            if !parser.is_artifact_resolve() {
                return Err(SamlError::InvalidOperation(format!(
                    "Unexpected SOAP message {} at the sign-on endpoint",
                    parser.message().name
                )));
            }
            let envelope = answer_artifact_resolve(&config, self.state.artifacts(), &parser)?;
            return Ok(SamlAction::Soap(envelope));
        }

        if let Some(artifact) = request.param(ARTIFACT_PARAM) {
            tracing::debug!(artifact = %artifact, "resolving response artifact");
            let message = resolve_artifact(
                &config,
                self.state.artifacts(),
                self.state.soap_client(),
                &artifact,
            )?;
            return self.consume(&config, &message, request.param(RELAY_STATE), session_id);
        }

        if let Some(saml_response) = request.form_param(SamlMessageType::Response.form_param()) {
            let relay_state = request.form_param(RELAY_STATE);
            let parser = PostBindingParser::new(None, Some(&saml_response), relay_state.as_deref())?;
            return self.consume(&config, parser.document().root(), relay_state, session_id);
        }

        self.initiate(&config, request, session_id)
    }

    fn initiate(
        &self,
        config: &Configuration,
        request: &dyn HttpRequest,
        session_id: &str,
    ) -> SamlResult<SamlAction> {
        let idp = match select_identity_provider(config, request, self.state.selection_strategy()) {
            IdentityProviderSelection::Selected(idp) => idp,
            IdentityProviderSelection::Redirect(url) => return Ok(SamlAction::Redirect(url)),
            IdentityProviderSelection::None => {
                return Err(SamlError::InvalidOperation(
                    "No identity provider could be selected".to_string(),
                ))
            }
        };

        let endpoint = sign_on_endpoint(idp)?;
        let acs = config.service_provider.require_endpoint(EndpointKind::SignOn)?;
        let mut authn_request = AuthnRequest::new(&config.service_provider.id)
            .with_destination(&endpoint.url)
            .with_acs_url(&acs.url)
            .with_binding(acs.binding.unwrap_or(SamlBinding::Post))
            .force_authn(idp.force_authn)
            .is_passive(idp.is_passive);
        if let Some(policy) = name_id_policy(config) {
            authn_request = authn_request.with_name_id_policy(policy);
        }

        self.state.sessions().set(
            session_id,
            session_keys::PENDING_AUTHN_REQUEST,
            &authn_request.id,
        )?;
        tracing::debug!(
            idp = %idp.id,
            binding = ?endpoint.binding,
            request = %authn_request.id,
            "initiating login"
        );

        let relay_state = request.param(RELAY_STATE);
        send_front_channel(
            config,
            self.state.artifacts(),
            &endpoint,
            &authn_request,
            SamlMessageType::Request,
            relay_state.as_deref(),
        )
    }

    fn consume(
        &self,
        config: &Configuration,
        response: &Element,
        relay_state: Option<String>,
        session_id: &str,
    ) -> SamlResult<SamlAction> {
        let sessions = self.state.sessions();
        let pending = sessions.get(session_id, session_keys::PENDING_AUTHN_REQUEST)?;
        let outcome = ResponseConsumer::new(config).consume(response, pending.as_deref())?;
        sessions.remove(session_id, session_keys::PENDING_AUTHN_REQUEST)?;

        let accepted = match outcome {
            ResponseOutcome::Accepted(accepted) => accepted,
            ResponseOutcome::NoPassive => return Ok(SamlAction::NoPassive { relay_state }),
        };
        let idp = accepted.idp;
        let name_id = accepted
            .assertion
            .name_id()
            .cloned()
            .ok_or_else(|| SamlError::format("Assertion subject does not carry a NameID"))?;
        let session_index = accepted.assertion.session_index().map(str::to_string);

        sessions.set(session_id, session_keys::IDP, &idp.id)?;
        sessions.set(session_id, session_keys::NAME_ID, &name_id.value)?;
        match &name_id.format {
            Some(format) => sessions.set(session_id, session_keys::NAME_ID_FORMAT, format)?,
            None => {
                sessions.remove(session_id, session_keys::NAME_ID_FORMAT)?;
            }
        }
        match &session_index {
            Some(index) => sessions.set(session_id, session_keys::SESSION_INDEX, index)?,
            None => {
                sessions.remove(session_id, session_keys::SESSION_INDEX)?;
            }
        }

        if let Some(accessor) = idp
            .endpoint(EndpointKind::SignOn)
            .and_then(|endpoint| endpoint.token_accessor.as_ref())
        {
            accessor.read_token(&accepted.element);
        }

        let identity = idp
            .pseudonym_mapper
            .as_ref()
            .map_or_else(|| name_id.value.clone(), |mapper| mapper.map_identity(&name_id));

        tracing::info!(idp = %idp.id, identity = %identity, "login completed");
        Ok(SamlAction::Authenticated(AuthenticatedSession {
            idp: idp.id.clone(),
            identity,
            session_index,
            attributes: accepted.assertion.attributes().cloned().collect(),
            relay_state,
            redirect_url: redirect_url(config, EndpointKind::SignOn),
            name_id,
        }))
    }
}

/// `NameIDPolicy` requesting the first configured format.
fn name_id_policy(config: &Configuration) -> Option<NameIdPolicy> {
    let formats = &config.name_id_formats;
    let policy = match formats.formats.first() {
        Some(format) => NameIdPolicy::with_format(*format),
        None if formats.allow_create.is_some() => NameIdPolicy::default(),
        None => return None,
    };
    Some(NameIdPolicy {
        allow_create: formats.allow_create,
        ..policy
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use saml2_cache::SessionStore;

    use super::super::fixtures::{self, Signed, ACS_URL, HOME_URL, IDP_ID};
    use super::*;
    use crate::bindings::RedirectBindingParser;
    use crate::extensions::{Extension, PseudonymMapper};
    use crate::protocol::InboundRequest;
    use crate::types::{NameId, NameIdFormat};

    const SESSION: &str = "session-1";

    fn start_login(state: &SamlState) -> String {
        let request = InboundRequest::get("https://sp.example.com/acs?RelayState=%2Fapp").unwrap();
        match LoginHandler::new(state).handle(&request, SESSION).unwrap() {
            SamlAction::Redirect(url) => url,
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    fn post_response(state: &SamlState, xml: &str) -> SamlResult<SamlAction> {
        let request = InboundRequest::post_form(
            ACS_URL,
            [("SAMLResponse", fixtures::post_encode(xml)), ("RelayState", "/app".to_string())],
        )?;
        LoginHandler::new(state).handle(&request, SESSION)
    }

    fn pending(state: &SamlState) -> Option<String> {
        state
            .sessions()
            .get(SESSION, session_keys::PENDING_AUTHN_REQUEST)
            .unwrap()
    }

    #[test]
    fn initiate_redirects_with_signed_authn_request() {
        let state = fixtures::state(fixtures::identity_provider());
        let url = start_login(&state);
        assert!(url.starts_with("https://idp.example.com/sso?SAMLRequest="));

        let parser = RedirectBindingParser::from_url(&url).unwrap();
        assert_eq!(parser.relay_state(), Some("/app"));
        assert!(parser.is_signed());
        let root = parser.document().root();
        assert_eq!(root.name, "AuthnRequest");
        assert_eq!(root.attribute("AssertionConsumerServiceURL"), Some(ACS_URL));
        assert_eq!(root.attribute("Destination"), Some("https://idp.example.com/sso"));
        assert_eq!(pending(&state).as_deref(), root.attribute("ID"));
    }

    #[test]
    fn name_id_policy_follows_configuration() {
        let mut config = fixtures::configuration(fixtures::identity_provider());
        assert!(name_id_policy(&config).is_none());

        config.name_id_formats.allow_create = Some(false);
        let policy = name_id_policy(&config).unwrap();
        assert_eq!(policy.allow_create, Some(false));
        assert!(policy.format.is_none());

        config.name_id_formats.formats = vec![NameIdFormat::Persistent, NameIdFormat::Transient];
        let policy = name_id_policy(&config).unwrap();
        assert_eq!(policy.parsed_format(), Some(NameIdFormat::Persistent));
    }

    #[test]
    fn posted_response_completes_login() {
        let state = fixtures::state(fixtures::identity_provider());
        let url = start_login(&state);
        let request_id = pending(&state).unwrap();
        assert!(!url.is_empty());

        let xml = fixtures::response_xml(Some(&request_id), Signed::Assertion);
        let SamlAction::Authenticated(session) = post_response(&state, &xml).unwrap() else {
            panic!("expected an authenticated session");
        };
        assert_eq!(session.idp, IDP_ID);
        assert_eq!(session.name_id.value, "alice-0001");
        assert_eq!(session.identity, "alice-0001");
        assert_eq!(session.session_index.as_deref(), Some("s-42"));
        assert_eq!(session.relay_state.as_deref(), Some("/app"));
        assert_eq!(session.redirect_url.as_deref(), Some(HOME_URL));
        assert_eq!(session.attributes.len(), 1);

        let sessions = state.sessions();
        assert_eq!(sessions.get(SESSION, session_keys::IDP).unwrap().as_deref(), Some(IDP_ID));
        assert_eq!(
            sessions.get(SESSION, session_keys::SESSION_INDEX).unwrap().as_deref(),
            Some("s-42")
        );
        assert!(pending(&state).is_none());
    }

    #[test]
    fn signed_response_envelope_is_accepted() {
        let state = fixtures::state(fixtures::identity_provider());
        start_login(&state);
        let request_id = pending(&state).unwrap();
        let xml = fixtures::response_xml(Some(&request_id), Signed::Response);
        assert!(matches!(post_response(&state, &xml).unwrap(), SamlAction::Authenticated(_)));
    }

    #[test]
    fn unsigned_response_is_rejected() {
        let state = fixtures::state(fixtures::identity_provider());
        start_login(&state);
        let request_id = pending(&state).unwrap();
        let xml = fixtures::response_xml(Some(&request_id), Signed::Nothing);
        assert!(matches!(post_response(&state, &xml), Err(SamlError::Security(_))));
        assert_eq!(pending(&state), Some(request_id));
    }

    #[test]
    fn unsigned_response_is_accepted_when_checks_are_omitted() {
        let mut idp = fixtures::identity_provider();
        idp.omit_assertion_signature_check = true;
        let state = fixtures::state(idp);
        start_login(&state);
        let request_id = pending(&state).unwrap();
        let xml = fixtures::response_xml(Some(&request_id), Signed::Nothing);
        assert!(matches!(post_response(&state, &xml).unwrap(), SamlAction::Authenticated(_)));
    }

    #[test]
    fn correlation_rules() {
        let state = fixtures::state(fixtures::identity_provider());
        start_login(&state);

        let xml = fixtures::response_xml(Some("_someone-else"), Signed::Assertion);
        assert!(matches!(post_response(&state, &xml), Err(SamlError::Security(_))));

        let unsolicited = fixtures::response_xml(None, Signed::Assertion);
        assert!(post_response(&state, &unsolicited)
            .unwrap_err()
            .to_string()
            .contains("may not initiate single sign-on"));

        let mut idp = fixtures::identity_provider();
        idp.allow_idp_initiated_sso = true;
        let state = fixtures::state(idp);
        assert!(matches!(
            post_response(&state, &unsolicited).unwrap(),
            SamlAction::Authenticated(_)
        ));

        let mut idp = fixtures::identity_provider();
        idp.allow_replay = true;
        let state = fixtures::state(idp);
        assert!(matches!(post_response(&state, &xml).unwrap(), SamlAction::Authenticated(_)));
    }

    #[test]
    fn no_passive_is_a_distinct_outcome() {
        let state = fixtures::state(fixtures::identity_provider());
        start_login(&state);
        let request_id = pending(&state).unwrap();
        let action = post_response(&state, &fixtures::no_passive_xml(&request_id)).unwrap();
        assert!(matches!(action, SamlAction::NoPassive { relay_state: Some(ref r) } if r == "/app"));
    }

    #[test]
    fn unknown_issuer_is_rejected() {
        let state = fixtures::state(fixtures::identity_provider());
        let xml = fixtures::response_xml(None, Signed::Assertion)
            .replace(IDP_ID, "https://rogue.example.com");
        assert!(matches!(
            post_response(&state, &xml),
            Err(SamlError::UnknownIdentityProvider(_))
        ));
    }

    #[test]
    fn pseudonym_mapper_sets_identity() {
        struct Upper;
        impl PseudonymMapper for Upper {
            fn map_identity(&self, name_id: &NameId) -> String {
                name_id.value.to_uppercase()
            }
        }

        let mut idp = fixtures::identity_provider();
        idp.allow_idp_initiated_sso = true;
        idp.pseudonym_mapper = Some(Extension::new("upper", Arc::new(Upper) as Arc<dyn PseudonymMapper>));
        let state = fixtures::state(idp);
        let xml = fixtures::response_xml(None, Signed::Assertion);
        let SamlAction::Authenticated(session) = post_response(&state, &xml).unwrap() else {
            panic!("expected an authenticated session");
        };
        assert_eq!(session.identity, "ALICE-0001");
    }

    #[test]
    fn selection_page_when_no_identity_provider_is_chosen() {
        let mut config = fixtures::configuration(fixtures::identity_provider());
        let mut second = fixtures::identity_provider();
        second.id = "https://idp2.example.com".to_string();
        config.identity_providers.push(second);
        config.selection.selection_url = Some("https://sp.example.com/choose".to_string());
        let state = SamlState::in_memory(crate::config::ConfigurationHandle::new(config));

        let request = InboundRequest::get("https://sp.example.com/acs").unwrap();
        let action = LoginHandler::new(&state).handle(&request, SESSION).unwrap();
        assert!(matches!(action, SamlAction::Redirect(ref url) if url == "https://sp.example.com/choose"));
    }
}
