//! SAML attribute queries over SOAP.

use super::consumer::{ResponseConsumer, ResponseOutcome};
use super::{session_keys, SamlState};
use crate::bindings::{SoapBindingParser, SoapEnvelope};
use crate::error::{SamlError, SamlResult};
use crate::selection::attribute_service_url;
use crate::types::{AttributeQuery, NameId, SamlAttribute};

/// Queries the attribute authority of the identity provider a session
/// logged in at.
pub struct AttributeQueryClient<'s> {
    state: &'s SamlState,
}

impl<'s> AttributeQueryClient<'s> {
    /// Creates a client over shared state.
    pub fn new(state: &'s SamlState) -> Self {
        Self { state }
    }

    /// Requests `attributes` of the session's principal; an empty slice asks
    /// for everything the authority releases.
    ///
    /// The answer passes the same checks as a login response.
    pub fn query(
        &self,
        session_id: &str,
        attributes: &[SamlAttribute],
    ) -> SamlResult<Vec<SamlAttribute>> {
        let config = self.state.config().current();
        let sessions = self.state.sessions();
        let idp_id = sessions
            .get(session_id, session_keys::IDP)?
            .ok_or_else(|| SamlError::InvalidOperation("No SAML session to query".to_string()))?;
        let idp = config.require_identity_provider(&idp_id)?;
        let value = sessions
            .get(session_id, session_keys::NAME_ID)?
            .ok_or_else(|| SamlError::InvalidOperation("Session has no NameID".to_string()))?;
        let mut subject = NameId::new(value);
        if let Some(format) = sessions.get(session_id, session_keys::NAME_ID_FORMAT)? {
            subject = subject.with_format_uri(format);
        }

        let url = attribute_service_url(idp)?;
        let query = attributes.iter().cloned().fold(
            AttributeQuery::new(&config.service_provider.id, subject).with_destination(&url),
            AttributeQuery::with_attribute,
        );
        let signed = config.signer().sign_element(query.to_element(), &query.id)?;
        tracing::debug!(idp = %idp.id, url = %url, query = %query.id, "sending attribute query");

        let body = self.state.soap_client().send(
            &url,
            &SoapEnvelope::to_xml(signed),
            &idp.artifact_resolution,
        )?;
        let parser = SoapBindingParser::from_bytes(&body)?;
        if !parser.is_response() {
            return Err(SamlError::format(format!(
                "Expected a Response, received {}",
                parser.message().name
            )));
        }

        match ResponseConsumer::new(&config).consume(parser.message(), Some(query.id.as_str()))? {
            ResponseOutcome::Accepted(accepted) => {
                if accepted.idp.id != idp.id {
                    return Err(SamlError::Security(format!(
                        "Attribute response was issued by {} instead of {}",
                        accepted.idp.id, idp.id
                    )));
                }
                Ok(accepted.assertion.attributes().cloned().collect())
            }
            ResponseOutcome::NoPassive => Err(SamlError::InvalidOperation(
                "Attribute authority answered NoPassive".to_string(),
            )),
        }
    }
}
