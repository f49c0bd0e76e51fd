//! Protocol orchestration.
//!
//! The handlers sequence selection, bindings, signature checks and
//! validation for one inbound HTTP request and tell the host what to answer
//! with a [`SamlAction`]. They keep nothing between requests except what
//! they put in the [`SamlState`] stores.
//!
//! - [`LoginHandler`] - Web Browser SSO: initiate, consume POST and
//!   artifact responses, answer artifact resolution
//! - [`LogoutHandler`] - Single Logout over the front and back channels
//! - [`AttributeQueryClient`] - SOAP attribute queries for a logged in
//!   principal

mod attribute_query;
mod consumer;
#[cfg(test)]
mod fixtures;
mod http;
mod login;
mod logout;
mod state;

pub use attribute_query::AttributeQueryClient;
pub use http::{HttpRequest, InboundRequest};
pub use login::LoginHandler;
pub use logout::LogoutHandler;
pub use state::SamlState;

use saml2_cache::ArtifactStore;

use crate::bindings::{
    ArtifactBinding, OutboundMessage, PostBindingBuilder, RedirectBindingBuilder, SamlMessageType,
};
use crate::config::{Configuration, EndpointKind};
use crate::error::{SamlError, SamlResult};
use crate::selection::ResolvedEndpoint;
use crate::types::{NameId, SamlAttribute, SamlBinding};

/// Keys the handlers use in the session store.
pub mod session_keys {
    /// Identity provider the principal logged in at.
    pub const IDP: &str = "saml2.idp";
    /// NameID value of the principal.
    pub const NAME_ID: &str = "saml2.name_id";
    /// NameID format of the principal.
    pub const NAME_ID_FORMAT: &str = "saml2.name_id_format";
    /// Session index at the identity provider.
    pub const SESSION_INDEX: &str = "saml2.session_index";
    /// ID of the outstanding `AuthnRequest`.
    pub const PENDING_AUTHN_REQUEST: &str = "saml2.pending_authn_request";
    /// ID of the outstanding `LogoutRequest`.
    pub const PENDING_LOGOUT_REQUEST: &str = "saml2.pending_logout_request";
}

/// A principal accepted by a login.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    /// Entity ID of the identity provider.
    pub idp: String,
    /// The NameID released by the identity provider.
    pub name_id: NameId,
    /// Local identity: the pseudonym mapper's result, else the NameID value.
    pub identity: String,
    /// Session index at the identity provider.
    pub session_index: Option<String>,
    /// Attributes from the assertion.
    pub attributes: Vec<SamlAttribute>,
    /// RelayState received with the response.
    pub relay_state: Option<String>,
    /// Configured post-login redirect.
    pub redirect_url: Option<String>,
}

/// What the host should answer with.
#[derive(Debug)]
pub enum SamlAction {
    /// Redirect the browser (HTTP 302) to the URL.
    Redirect(String),
    /// Serve an HTML page, the self-submitting form of the POST binding.
    Html(String),
    /// Answer a back-channel call with this SOAP envelope.
    Soap(String),
    /// Login completed.
    Authenticated(AuthenticatedSession),
    /// The identity provider could not authenticate the principal without
    /// interaction.
    NoPassive {
        /// RelayState received with the response.
        relay_state: Option<String>,
    },
    /// The local session was terminated.
    LoggedOut {
        /// Configured post-logout redirect.
        redirect_url: Option<String>,
    },
    /// An identity provider terminated a principal's sessions over the back
    /// channel. The host ends every local session of the principal and
    /// answers with the envelope.
    BackChannelLogout {
        /// The principal to log out.
        name_id: NameId,
        /// Session indexes named by the request; empty means all.
        session_indexes: Vec<String>,
        /// SOAP envelope carrying the `LogoutResponse`.
        envelope: String,
    },
}

/// Sends `message` to `endpoint` over a front-channel binding.
///
/// Redirect signs the query string; POST and Artifact sign the message.
pub(crate) fn send_front_channel(
    config: &Configuration,
    artifacts: &dyn ArtifactStore,
    endpoint: &ResolvedEndpoint,
    message: &impl OutboundMessage,
    message_type: SamlMessageType,
    relay_state: Option<&str>,
) -> SamlResult<SamlAction> {
    tracing::debug!(binding = ?endpoint.binding, url = %endpoint.url, "sending message");
    match endpoint.binding {
        SamlBinding::Redirect => {
            let xml = message.message_element().to_xml();
            let builder = match message_type {
                SamlMessageType::Request => RedirectBindingBuilder::new().with_request(xml)?,
                SamlMessageType::Response => RedirectBindingBuilder::new().with_response(xml)?,
            };
            let builder = match relay_state {
                Some(relay_state) => builder.with_relay_state(relay_state),
                None => builder,
            };
            let url = builder.with_signer(config.signer()).to_url(&endpoint.url)?;
            Ok(SamlAction::Redirect(url))
        }
        SamlBinding::Post => {
            let signed = config
                .signer()
                .sign_element(message.message_element(), message.message_id())?;
            let builder = PostBindingBuilder::new(&endpoint.url);
            let builder = match message_type {
                SamlMessageType::Request => builder.with_request(signed.to_xml()),
                SamlMessageType::Response => builder.with_response(signed.to_xml()),
            };
            Ok(SamlAction::Html(builder.with_relay_state(relay_state).to_form()?))
        }
        SamlBinding::Artifact => {
            let binding = ArtifactBinding::new(config, artifacts);
            let url = match message_type {
                SamlMessageType::Request if is_sign_on(message) => {
                    binding.redirect_from_login(&endpoint.url, message, relay_state)?
                }
                _ => binding.redirect_from_logout(&endpoint.url, message, relay_state)?,
            };
            Ok(SamlAction::Redirect(url))
        }
        SamlBinding::Soap => Err(SamlError::UnsupportedBinding(format!(
            "{} is not a front-channel binding",
            SamlBinding::Soap.uri()
        ))),
    }
}

fn is_sign_on(message: &impl OutboundMessage) -> bool {
    message.message_element().name == "AuthnRequest"
}

/// Post-flow redirect of the SP endpoint of `kind`.
pub(crate) fn redirect_url(config: &Configuration, kind: EndpointKind) -> Option<String> {
    config
        .service_provider
        .endpoint(kind)
        .and_then(|endpoint| endpoint.redirect_url.clone())
}
