//! Single Logout.

use super::consumer::{answer_artifact_resolve, resolve_artifact};
use super::http::HttpRequest;
use super::{redirect_url, send_front_channel, session_keys, SamlAction, SamlState};
use crate::bindings::{
    PostBindingParser, RedirectBindingParser, SamlMessageType, SoapBindingParser, SoapEnvelope,
    ARTIFACT_PARAM,
};
use crate::config::{Configuration, EndpointKind, IdentityProvider};
use crate::error::{SamlError, SamlResult};
use crate::selection::logout_endpoint;
use crate::types::{LogoutRequest, LogoutResponse, NameId, SamlBinding, Status, SAMLP_NS, SAML_NS};
use crate::xml::Element;

const RELAY_STATE: &str = "RelayState";

/// Handles the SP single logout endpoint and starts SP-initiated logout.
pub struct LogoutHandler<'s> {
    state: &'s SamlState,
}

/// A front-channel message whose signature has been checked.
struct VerifiedMessage<'c> {
    idp: &'c IdentityProvider,
    element: Element,
    relay_state: Option<String>,
}

impl<'s> LogoutHandler<'s> {
    /// Creates a handler over shared state.
    pub fn new(state: &'s SamlState) -> Self {
        Self { state }
    }

    /// Logs the session out at the identity provider it logged in at.
    ///
    /// Over a front-channel binding the browser is sent to the identity
    /// provider and the session ends when its `LogoutResponse` comes back.
    /// Over SOAP the exchange completes within this call.
    pub fn initiate(&self, session_id: &str, relay_state: Option<&str>) -> SamlResult<SamlAction> {
        let config = self.state.config().current();
        let sessions = self.state.sessions();
        let idp_id = sessions
            .get(session_id, session_keys::IDP)?
            .ok_or_else(|| SamlError::InvalidOperation("No SAML session to log out".to_string()))?;
        let idp = config.require_identity_provider(&idp_id)?;
        let name_id = sessions
            .get(session_id, session_keys::NAME_ID)?
            .ok_or_else(|| SamlError::InvalidOperation("Session has no NameID".to_string()))?;
        let mut name_id = NameId::new(name_id);
        if let Some(format) = sessions.get(session_id, session_keys::NAME_ID_FORMAT)? {
            name_id = name_id.with_format_uri(format);
        }

        let endpoint = logout_endpoint(idp)?;
        let mut request = LogoutRequest::new(&config.service_provider.id, name_id)
            .with_destination(&endpoint.url)
            .with_reason(LogoutRequest::REASON_USER);
        if let Some(index) = sessions.get(session_id, session_keys::SESSION_INDEX)? {
            request = request.with_session_index(index);
        }
        tracing::debug!(
            idp = %idp.id,
            binding = ?endpoint.binding,
            request = %request.id,
            "initiating logout"
        );

        if endpoint.binding == SamlBinding::Soap {
            return self.logout_back_channel(&config, idp, &endpoint.url, &request, session_id);
        }

        sessions.set(session_id, session_keys::PENDING_LOGOUT_REQUEST, &request.id)?;
        send_front_channel(
            &config,
            self.state.artifacts(),
            &endpoint,
            &request,
            SamlMessageType::Request,
            relay_state,
        )
    }

    fn logout_back_channel(
        &self,
        config: &Configuration,
        idp: &IdentityProvider,
        url: &str,
        request: &LogoutRequest,
        session_id: &str,
    ) -> SamlResult<SamlAction> {
        let signed = config.signer().sign_element(request.to_element(), &request.id)?;
        let body = self.state.soap_client().send(
            url,
            &SoapEnvelope::to_xml(signed),
            &idp.artifact_resolution,
        )?;

        let parser = SoapBindingParser::from_bytes(&body)?;
        if !parser.is_logout_response() {
            return Err(SamlError::format(format!(
                "Expected a LogoutResponse, received {}",
                parser.message().name
            )));
        }
        if !parser.check_saml_message_signature(&config.identity_provider_keys(idp)) {
            tracing::error!(idp = %idp.id, "logout response signature verification failed");
            return Err(SamlError::Security(
                "LogoutResponse signature verification failed".to_string(),
            ));
        }
        let response = parser.logout_response()?;
        self.complete_logout(config, &response, Some(request.id.as_str()), session_id)
    }

    /// Handles one request to the single logout endpoint.
    pub fn handle(&self, request: &dyn HttpRequest, session_id: &str) -> SamlResult<SamlAction> {
        let config = self.state.config().current();

        if request.is_soap() {
            let parser = SoapBindingParser::from_bytes(request.body())?;
            if parser.is_artifact_resolve() {
                let envelope = answer_artifact_resolve(&config, self.state.artifacts(), &parser)?;
                return Ok(SamlAction::Soap(envelope));
            }
            if parser.is_logout_request() {
                return self.handle_back_channel_request(&config, &parser);
            }
            return Err(SamlError::InvalidOperation(format!(
                "Unexpected SOAP message {} at the logout endpoint",
                parser.message().name
            )));
        }

        let message = self.receive_front_channel(&config, request)?;
        let root = &message.element;
        if root.is(SAMLP_NS, "LogoutRequest") {
            let logout_request = LogoutRequest::from_element(root)?;
            self.handle_logout_request(&config, message.idp, &logout_request, message.relay_state, session_id)
        } else if root.is(SAMLP_NS, "LogoutResponse") {
            let response = LogoutResponse::from_element(root)?;
            let pending = self
                .state
                .sessions()
                .get(session_id, session_keys::PENDING_LOGOUT_REQUEST)?;
            self.complete_logout(&config, &response, pending.as_deref(), session_id)
        } else {
            Err(SamlError::format(format!(
                "Unexpected message {} at the logout endpoint",
                root.name
            )))
        }
    }

    /// Decodes the message of an artifact, Redirect or POST request and
    /// checks its signature.
    fn receive_front_channel<'c>(
        &self,
        config: &'c Configuration,
        request: &dyn HttpRequest,
    ) -> SamlResult<VerifiedMessage<'c>> {
        if let Some(artifact) = request.param(ARTIFACT_PARAM) {
            let element = resolve_artifact(
                config,
                self.state.artifacts(),
                self.state.soap_client(),
                &artifact,
            )?;
            let idp = message_issuer(config, &element)?;
            return Ok(VerifiedMessage {
                idp,
                element,
                relay_state: request.param(RELAY_STATE),
            });
        }

        let request_param = SamlMessageType::Request.form_param();
        let response_param = SamlMessageType::Response.form_param();

        if request.method() == "GET" {
            let parser = RedirectBindingParser::from_url(request.url())?;
            let root = parser.document().root();
            let idp = message_issuer(config, root)?;
            if !parser.verify_signature(&config.identity_provider_keys(idp)) {
                tracing::error!(idp = %idp.id, "redirect signature verification failed");
                return Err(SamlError::Security(format!(
                    "{} signature verification failed",
                    root.name
                )));
            }
            return Ok(VerifiedMessage {
                idp,
                element: root.clone(),
                relay_state: parser.relay_state().map(str::to_string),
            });
        }

        let saml_request = request.form_param(request_param);
        let saml_response = request.form_param(response_param);
        let relay_state = request.form_param(RELAY_STATE);
        let parser = PostBindingParser::new(
            saml_request.as_deref(),
            saml_response.as_deref(),
            relay_state.as_deref(),
        )?;
        let root = parser.document().root();
        let idp = message_issuer(config, root)?;
        if !parser.check_signature(&config.identity_provider_keys(idp)) {
            tracing::error!(idp = %idp.id, "POST signature verification failed");
            return Err(SamlError::Security(format!(
                "{} signature verification failed",
                root.name
            )));
        }
        Ok(VerifiedMessage {
            idp,
            element: root.clone(),
            relay_state,
        })
    }

    /// Identity provider initiated logout over the front channel.
    ///
    /// The local session ends when it belongs to the principal named in the
    /// request; the browser is then sent back with a `LogoutResponse`.
    fn handle_logout_request(
        &self,
        config: &Configuration,
        idp: &IdentityProvider,
        request: &LogoutRequest,
        relay_state: Option<String>,
        session_id: &str,
    ) -> SamlResult<SamlAction> {
        let status = if request.is_expired() {
            tracing::warn!(idp = %idp.id, request = %request.id, "expired logout request");
            Status::requester_error("LogoutRequest has expired")
        } else if self.session_matches(idp, &request.name_id, session_id)? {
            self.state.sessions().clear(session_id)?;
            tracing::info!(idp = %idp.id, "session logged out by identity provider");
            Status::success()
        } else {
            tracing::warn!(idp = %idp.id, request = %request.id, "logout request names no local session");
            Status::requester_error("No session for the principal")
        };

        let endpoint = logout_endpoint(idp)?;
        let response = LogoutResponse::with_status(&config.service_provider.id, &request.id, status)
            .with_destination(&endpoint.url);
        send_front_channel(
            config,
            self.state.artifacts(),
            &endpoint,
            &response,
            SamlMessageType::Response,
            relay_state.as_deref(),
        )
    }

    fn session_matches(
        &self,
        idp: &IdentityProvider,
        name_id: &NameId,
        session_id: &str,
    ) -> SamlResult<bool> {
        let sessions = self.state.sessions();
        let session_idp = sessions.get(session_id, session_keys::IDP)?;
        let session_name_id = sessions.get(session_id, session_keys::NAME_ID)?;
        Ok(session_idp.as_deref() == Some(idp.id.as_str())
            && session_name_id.as_deref() == Some(name_id.value.as_str()))
    }

    /// Identity provider initiated logout over SOAP. The host ends the
    /// principal's sessions, which this handler cannot enumerate.
    fn handle_back_channel_request(
        &self,
        config: &Configuration,
        parser: &SoapBindingParser,
    ) -> SamlResult<SamlAction> {
        let request = parser.logout_request()?;
        let idp = config.identity_provider(&request.issuer).ok_or_else(|| {
            tracing::error!(issuer = %request.issuer, "logout request from unknown identity provider");
            SamlError::UnknownIdentityProvider(request.issuer.clone())
        })?;
        if !parser.check_saml_message_signature(&config.identity_provider_keys(idp)) {
            tracing::error!(idp = %idp.id, "logout request signature verification failed");
            return Err(SamlError::Security(
                "LogoutRequest signature verification failed".to_string(),
            ));
        }

        let sp = &config.service_provider.id;
        if request.is_expired() {
            tracing::warn!(idp = %idp.id, request = %request.id, "expired logout request");
            let response = LogoutResponse::with_status(
                sp,
                &request.id,
                Status::requester_error("LogoutRequest has expired"),
            );
            let signed = config.signer().sign_element(response.to_element(), &response.id)?;
            return Ok(SamlAction::Soap(SoapEnvelope::to_xml(signed)));
        }

        let response = LogoutResponse::success(sp, &request.id);
        let signed = config.signer().sign_element(response.to_element(), &response.id)?;
        tracing::info!(idp = %idp.id, sessions = request.session_indexes.len(), "back-channel logout");
        Ok(SamlAction::BackChannelLogout {
            name_id: request.name_id,
            session_indexes: request.session_indexes,
            envelope: SoapEnvelope::to_xml(signed),
        })
    }

    /// Ends the session once the identity provider answered our
    /// `LogoutRequest`. A failure status is logged; the local session ends
    /// regardless.
    fn complete_logout(
        &self,
        config: &Configuration,
        response: &LogoutResponse,
        pending_request: Option<&str>,
        session_id: &str,
    ) -> SamlResult<SamlAction> {
        let in_response_to = response.in_response_to.as_deref();
        if pending_request.is_none() || in_response_to != pending_request {
            tracing::error!(
                issuer = %response.issuer,
                ?in_response_to,
                "logout response does not match a pending request"
            );
            return Err(SamlError::Security(
                "LogoutResponse does not answer a pending LogoutRequest".to_string(),
            ));
        }
        if !response.is_success() {
            tracing::warn!(
                issuer = %response.issuer,
                status = %response.status.status_code.value,
                "identity provider reported a logout failure"
            );
        }

        self.state.sessions().clear(session_id)?;
        tracing::info!(issuer = %response.issuer, "logout completed");
        Ok(SamlAction::LoggedOut {
            redirect_url: redirect_url(config, EndpointKind::Logout),
        })
    }
}

/// The configured identity provider that issued `message`.
fn message_issuer<'c>(config: &'c Configuration, message: &Element) -> SamlResult<&'c IdentityProvider> {
    let issuer = message
        .child_text(SAML_NS, "Issuer")
        .ok_or_else(|| SamlError::format(format!("{} has no Issuer", message.name)))?;
    config.identity_provider(issuer.trim()).ok_or_else(|| {
        tracing::error!(issuer = %issuer, "logout message from unknown identity provider");
        SamlError::UnknownIdentityProvider(issuer.clone())
    })
}
