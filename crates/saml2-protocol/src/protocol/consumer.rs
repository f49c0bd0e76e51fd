//! Response acceptance and artifact plumbing shared by the handlers.

use chrono::{TimeDelta, Utc};
use saml2_cache::ArtifactStore;

use crate::bindings::{ArtifactBinding, SoapBindingParser, SoapClient};
use crate::config::{Configuration, IdentityProvider};
use crate::error::{SamlError, SamlResult};
use crate::signature::check_element_signature;
use crate::types::{Assertion, Response, SAML_NS, XMLDSIG_NS};
use crate::validation::AssertionValidator;
use crate::xml::Element;

/// An assertion that passed every check.
pub(crate) struct AcceptedAssertion<'c> {
    pub idp: &'c IdentityProvider,
    pub assertion: Assertion,
    pub element: Element,
}

pub(crate) enum ResponseOutcome<'c> {
    Accepted(AcceptedAssertion<'c>),
    NoPassive,
}

/// Runs the acceptance checks on a `samlp:Response` from an identity
/// provider.
pub(crate) struct ResponseConsumer<'c> {
    config: &'c Configuration,
}

impl<'c> ResponseConsumer<'c> {
    pub fn new(config: &'c Configuration) -> Self {
        Self { config }
    }

    /// Accepts `root` if it answers `pending_request`, or is unsolicited and
    /// the issuer allows that.
    pub fn consume(
        &self,
        root: &Element,
        pending_request: Option<&str>,
    ) -> SamlResult<ResponseOutcome<'c>> {
        let response = Response::from_element(root)?;

        if !response.is_success() {
            if response.status.is_no_passive() {
                tracing::debug!(response = %response.id, "identity provider answered NoPassive");
                return Ok(ResponseOutcome::NoPassive);
            }
            let status = &response.status.status_code;
            tracing::warn!(
                status = %status.value,
                sub_status = ?status.sub_status_value(),
                message = ?response.status.status_message,
                "identity provider returned an error status"
            );
            return Err(SamlError::Security(format!(
                "Response status is not success: {}",
                status.sub_status_value().unwrap_or(status.value.as_str())
            )));
        }

        let issuer = response
            .issuer
            .as_deref()
            .ok_or_else(|| SamlError::Security("Response has no Issuer".to_string()))?;
        let idp = self.config.identity_provider(issuer).ok_or_else(|| {
            tracing::error!(issuer, "response from unknown identity provider");
            SamlError::UnknownIdentityProvider(issuer.to_string())
        })?;

        check_correlation(idp, &response, pending_request)?;

        if response.encrypted_assertions > 0 {
            return Err(SamlError::format("EncryptedAssertion elements are not supported"));
        }
        let [element] = response.assertions.as_slice() else {
            return Err(SamlError::format(format!(
                "Response must contain exactly one Assertion, found {}",
                response.assertions.len()
            )));
        };

        if !idp.omit_assertion_signature_check {
            self.check_signature(idp, root, &response, element)?;
        }

        let assertion = Assertion::from_element(element)?;
        let skew = TimeDelta::from_std(self.config.clock_skew)
            .map_err(|e| SamlError::Configuration(format!("clock skew out of range: {e}")))?;
        let validator =
            AssertionValidator::new(self.config.allowed_audiences.iter().cloned(), idp.quirks_mode);
        validator.validate_assertion(&assertion)?;
        validator.validate_time_restrictions(&assertion, skew, Utc::now())?;

        let assertion_issuer = assertion.issuer.as_ref().map(|issuer| issuer.value.as_str());
        if assertion_issuer != Some(idp.id.as_str()) {
            tracing::error!(idp = %idp.id, ?assertion_issuer, "assertion issuer mismatch");
            return Err(SamlError::Security(format!(
                "Assertion was not issued by {}",
                idp.id
            )));
        }

        if let Some(check) = &idp.assertion_check {
            check.check(&assertion, element)?;
        }

        tracing::debug!(idp = %idp.id, response = %response.id, "response accepted");
        Ok(ResponseOutcome::Accepted(AcceptedAssertion {
            idp,
            assertion,
            element: element.clone(),
        }))
    }

    /// A signed assertion is checked in place; otherwise the response must
    /// be signed.
    fn check_signature(
        &self,
        idp: &IdentityProvider,
        root: &Element,
        response: &Response,
        assertion: &Element,
    ) -> SamlResult<()> {
        let keys = self.config.identity_provider_keys(idp);
        let assertion_signed = assertion.find_child(XMLDSIG_NS, "Signature").is_some();
        let verified = match assertion.id() {
            Some(id) if assertion_signed => check_element_signature(root, id, &keys),
            _ if response.signed => check_element_signature(root, &response.id, &keys),
            _ => false,
        };
        if verified {
            return Ok(());
        }
        tracing::error!(idp = %idp.id, keys = keys.len(), "response signature verification failed");
        Err(SamlError::Security(
            "Neither the assertion nor the response carries a valid signature".to_string(),
        ))
    }
}

fn check_correlation(
    idp: &IdentityProvider,
    response: &Response,
    pending_request: Option<&str>,
) -> SamlResult<()> {
    match response.in_response_to.as_deref() {
        None if idp.allow_idp_initiated_sso => Ok(()),
        None => {
            tracing::error!(idp = %idp.id, "unsolicited response rejected");
            Err(SamlError::Security(format!(
                "Identity provider {} may not initiate single sign-on",
                idp.id
            )))
        }
        Some(_) if idp.allow_replay => Ok(()),
        Some(in_response_to) if pending_request == Some(in_response_to) => Ok(()),
        Some(in_response_to) => {
            tracing::error!(idp = %idp.id, in_response_to, "response does not match a pending request");
            Err(SamlError::Security(format!(
                "InResponseTo {in_response_to} does not match a pending request"
            )))
        }
    }
}

/// Resolves `artifact` at its issuer and returns the verified message it
/// stood for.
pub(crate) fn resolve_artifact(
    config: &Configuration,
    artifacts: &dyn ArtifactStore,
    client: &dyn SoapClient,
    artifact: &str,
) -> SamlResult<Element> {
    let body = ArtifactBinding::new(config, artifacts).resolve_artifact(artifact, client)?;
    let parser = SoapBindingParser::from_bytes(&body)?;
    if !parser.is_artifact_response() {
        return Err(SamlError::format(format!(
            "Expected an ArtifactResponse, received {}",
            parser.message().name
        )));
    }
    let response = parser.artifact_response()?;
    let idp = config.identity_provider(&response.issuer).ok_or_else(|| {
        tracing::error!(issuer = %response.issuer, "artifact response from unknown identity provider");
        SamlError::UnknownIdentityProvider(response.issuer.clone())
    })?;

    if !idp.omit_assertion_signature_check
        && !parser.check_saml_message_signature(&config.identity_provider_keys(idp))
    {
        tracing::error!(idp = %idp.id, "artifact response signature verification failed");
        return Err(SamlError::Security(
            "ArtifactResponse signature verification failed".to_string(),
        ));
    }
    if !response.status.is_success() {
        return Err(SamlError::Security(format!(
            "ArtifactResponse status is not success: {}",
            response.status.status_code.value
        )));
    }
    let message = response.message.ok_or_else(|| {
        tracing::warn!(idp = %idp.id, artifact, "artifact resolved to no message");
        SamlError::Security("Artifact could not be resolved".to_string())
    })?;

    // The resolved message must come from the signer of the ArtifactResponse.
    if let Some(issuer) = message.child_text(SAML_NS, "Issuer") {
        if issuer != idp.id {
            tracing::error!(idp = %idp.id, issuer = %issuer, "artifact resolved to a message from another issuer");
            return Err(SamlError::Security(format!(
                "{} issuer {issuer} does not match ArtifactResponse issuer {}",
                message.name, idp.id
            )));
        }
    }
    Ok(message)
}

/// Answers an identity provider's `ArtifactResolve` with the stored
/// message. The request must be signed by a configured identity provider.
pub(crate) fn answer_artifact_resolve(
    config: &Configuration,
    artifacts: &dyn ArtifactStore,
    parser: &SoapBindingParser,
) -> SamlResult<String> {
    let resolve = parser.artifact_resolve()?;
    let idp = config.identity_provider(&resolve.issuer).ok_or_else(|| {
        tracing::error!(issuer = %resolve.issuer, "artifact resolve from unknown identity provider");
        SamlError::UnknownIdentityProvider(resolve.issuer.clone())
    })?;
    if !parser.check_saml_message_signature(&config.identity_provider_keys(idp)) {
        tracing::error!(idp = %idp.id, "artifact resolve signature verification failed");
        return Err(SamlError::Security(
            "ArtifactResolve signature verification failed".to_string(),
        ));
    }
    ArtifactBinding::new(config, artifacts).respond_to_artifact_resolve(&resolve)
}
