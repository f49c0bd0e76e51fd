//! HTTP-Artifact binding.
//!
//! The browser carries a 44-byte artifact; the message it stands for stays
//! in the issuer's [`ArtifactStore`] until the peer resolves it with a
//! signed `ArtifactResolve` over SOAP.

use saml2_cache::ArtifactStore;

use super::client::SoapClient;
use super::soap::SoapEnvelope;
use super::OutboundMessage;
use crate::artifact::Artifact;
use crate::config::{Configuration, EndpointKind};
use crate::error::{SamlError, SamlResult};
use crate::selection;
use crate::types::{ArtifactResolve, ArtifactResponse};
use crate::xml::XmlDocument;

/// Query parameter carrying the artifact.
pub const ARTIFACT_PARAM: &str = "SAMLart";

/// Issues and resolves artifacts for one configuration snapshot.
pub struct ArtifactBinding<'a> {
    config: &'a Configuration,
    store: &'a dyn ArtifactStore,
}

impl<'a> ArtifactBinding<'a> {
    /// Creates the binding.
    pub fn new(config: &'a Configuration, store: &'a dyn ArtifactStore) -> Self {
        Self { config, store }
    }

    /// Signs and stores an authentication request; returns the redirect URL.
    ///
    /// The artifact carries the index of the SP's sign-on endpoint.
    pub fn redirect_from_login(
        &self,
        destination: &str,
        request: &impl OutboundMessage,
        relay_state: Option<&str>,
    ) -> SamlResult<String> {
        self.redirect(EndpointKind::SignOn, destination, request, relay_state)
    }

    /// Signs and stores a logout request or response; returns the redirect
    /// URL.
    pub fn redirect_from_logout(
        &self,
        destination: &str,
        message: &impl OutboundMessage,
        relay_state: Option<&str>,
    ) -> SamlResult<String> {
        self.redirect(EndpointKind::Logout, destination, message, relay_state)
    }

    fn redirect(
        &self,
        kind: EndpointKind,
        destination: &str,
        message: &impl OutboundMessage,
        relay_state: Option<&str>,
    ) -> SamlResult<String> {
        let sp = &self.config.service_provider;
        let index = sp.endpoint(kind).map_or(0, |e| e.index);
        let index = i16::try_from(index).map_err(|_| {
            SamlError::InvalidArgument(format!("endpoint index {index} does not fit an artifact"))
        })?;

        let signed = self
            .config
            .signer()
            .sign_element(message.message_element(), message.message_id())?;
        let artifact = Artifact::new(index, &sp.id).encode();
        self.store
            .insert(&artifact, signed.to_xml(), self.config.artifact_lifetime)?;

        let separator = if destination.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{destination}{separator}{ARTIFACT_PARAM}={}",
            urlencoding::encode(&artifact)
        );
        if let Some(relay_state) = relay_state {
            url.push_str("&RelayState=");
            url.push_str(&urlencoding::encode(relay_state));
        }

        tracing::debug!(artifact = %artifact, endpoint_index = index, "artifact issued");
        Ok(url)
    }

    /// Resolves an artifact at the identity provider that issued it.
    ///
    /// Returns the raw SOAP response.
    pub fn resolve_artifact(&self, artifact: &str, client: &dyn SoapClient) -> SamlResult<Vec<u8>> {
        let parsed = Artifact::parse(artifact)?;
        let idp = self
            .config
            .identity_providers
            .iter()
            .find(|idp| parsed.is_from(&idp.id))
            .ok_or_else(|| {
                tracing::error!(artifact, "artifact source matches no identity provider");
                SamlError::InvalidOperation("Received artifact from unknown IDP.".to_string())
            })?;
        let url = selection::artifact_resolution_url(idp, parsed.endpoint_index())?;

        let resolve = ArtifactResolve::new(&self.config.service_provider.id, artifact)
            .with_destination(&url);
        let signed = self
            .config
            .signer()
            .sign_element(resolve.to_element(), &resolve.id)?;

        tracing::debug!(idp = %idp.id, url = %url, "resolving artifact");
        client.send(&url, &SoapEnvelope::to_xml(signed), &idp.artifact_resolution)
    }

    /// Answers an `ArtifactResolve` with the stored message.
    ///
    /// Returns the SOAP envelope to send. An unknown or expired artifact is
    /// answered with a successful response that carries no message.
    pub fn respond_to_artifact_resolve(&self, resolve: &ArtifactResolve) -> SamlResult<String> {
        let message = self
            .store
            .take(&resolve.artifact)?
            .map(|xml| XmlDocument::parse(&xml).map(XmlDocument::into_root))
            .transpose()?;
        if message.is_none() {
            tracing::warn!(artifact = %resolve.artifact, issuer = %resolve.issuer, "artifact not found");
        }

        let response =
            ArtifactResponse::success(&self.config.service_provider.id, &resolve.id, message);
        let signed = self
            .config
            .signer()
            .sign_element(response.to_element(), &response.id)?;
        Ok(SoapEnvelope::to_xml(signed))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use saml2_cache::InMemoryArtifactStore;

    use super::*;
    use crate::bindings::SoapBindingParser;
    use crate::config::{
        ArtifactResolutionSettings, IdentityProvider, ServiceProvider, ServiceProviderEndpoint,
    };
    use crate::metadata::{EntityMetadata, MetadataEndpoint};
    use crate::signature::{check_signature_with_keys, SigningCredential};
    use crate::types::{AuthnRequest, SamlBinding};

    const SP_KEY: &str = include_str!("../../testdata/sp.key.pem");
    const SP_CERT: &str = include_str!("../../testdata/sp.crt.pem");

    fn loopback_metadata(id: &str) -> EntityMetadata {
        EntityMetadata {
            entity_id: id.to_string(),
            organization_name: None,
            valid_until: None,
            signing_certificates: Vec::new(),
            single_sign_on_services: Vec::new(),
            single_logout_services: Vec::new(),
            artifact_resolution_services: vec![MetadataEndpoint {
                binding: Some(SamlBinding::Soap),
                location: "https://idp1/artifact".to_string(),
                response_location: None,
                index: Some(1),
                is_default: true,
            }],
            attribute_services: Vec::new(),
        }
    }

    /// The SP plays both sides: its entity ID is the one IdP it trusts.
    fn loopback_config() -> Configuration {
        let sp = ServiceProvider::new("idp1", SigningCredential::from_pem(SP_KEY, SP_CERT).unwrap())
            .with_endpoint(
                ServiceProviderEndpoint::new(EndpointKind::SignOn, "https://sp/acs").with_index(1),
            );
        let mut idp = IdentityProvider::new("idp1");
        idp.metadata = Some(Arc::new(loopback_metadata("idp1")));
        Configuration::new(sp, vec![idp]).unwrap()
    }

    struct Loopback<'a> {
        binding: &'a ArtifactBinding<'a>,
    }

    impl SoapClient for Loopback<'_> {
        fn send(
            &self,
            url: &str,
            envelope: &str,
            _credentials: &ArtifactResolutionSettings,
        ) -> SamlResult<Vec<u8>> {
            assert_eq!(url, "https://idp1/artifact");
            let parser = SoapBindingParser::from_xml(envelope)?;
            assert!(parser.is_artifact_resolve());
            let resolve = parser.artifact_resolve()?;
            Ok(self.binding.respond_to_artifact_resolve(&resolve)?.into_bytes())
        }
    }

    #[test]
    fn artifact_redirect_and_resolve_roundtrip() {
        let config = loopback_config();
        let store = InMemoryArtifactStore::new();
        let binding = ArtifactBinding::new(&config, &store);

        let request = AuthnRequest::new("idp1").with_destination("https://idp1/sso");
        let url = binding
            .redirect_from_login("https://idp1/sso", &request, None)
            .unwrap();
        assert!(url.starts_with("https://idp1/sso?SAMLart="));
        assert!(!url.contains("RelayState"));

        let encoded = url.split_once("SAMLart=").unwrap().1;
        let artifact = urlencoding::decode(encoded).unwrap().into_owned();
        let parsed = Artifact::parse(&artifact).unwrap();
        assert_eq!(parsed.endpoint_index(), 1);
        assert!(parsed.is_from("idp1"));
        assert_eq!(store.len(), 1);

        let response = binding
            .resolve_artifact(&artifact, &Loopback { binding: &binding })
            .unwrap();
        let parser = SoapBindingParser::from_bytes(&response).unwrap();
        let key = config.service_provider.credential.certificate().public_key().clone();
        assert!(parser.check_saml_message_signature(std::slice::from_ref(&key)));

        let artifact_response = parser.artifact_response().unwrap();
        let message = artifact_response.message.unwrap();
        assert_eq!(message.id(), Some(request.id.as_str()));
        assert!(check_signature_with_keys(&XmlDocument::from_root(message), &[key]));
        assert!(store.is_empty());
    }

    #[test]
    fn unresolved_artifacts_do_not_accumulate() {
        let mut config = loopback_config();
        config.artifact_lifetime = std::time::Duration::ZERO;
        let store = InMemoryArtifactStore::new();
        let binding = ArtifactBinding::new(&config, &store);

        for _ in 0..50 {
            let request = AuthnRequest::new("idp1");
            binding
                .redirect_from_login("https://idp1/sso", &request, None)
                .unwrap();
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn relay_state_is_appended() {
        let config = loopback_config();
        let store = InMemoryArtifactStore::new();
        let binding = ArtifactBinding::new(&config, &store);
        let request = AuthnRequest::new("idp1");
        let url = binding
            .redirect_from_login("https://idp1/sso?x=1", &request, Some("a b"))
            .unwrap();
        assert!(url.starts_with("https://idp1/sso?x=1&SAMLart="));
        assert!(url.ends_with("&RelayState=a%20b"));
    }

    #[test]
    fn unknown_source_is_rejected() {
        let config = loopback_config();
        let store = InMemoryArtifactStore::new();
        let binding = ArtifactBinding::new(&config, &store);
        let foreign = Artifact::new(0, "https://elsewhere").encode();

        struct Unreachable;
        impl SoapClient for Unreachable {
            fn send(&self, _: &str, _: &str, _: &ArtifactResolutionSettings) -> SamlResult<Vec<u8>> {
                unreachable!("no request expected")
            }
        }

        let err = binding.resolve_artifact(&foreign, &Unreachable).unwrap_err();
        assert_eq!(err.to_string(), "Received artifact from unknown IDP.");
    }

    #[test]
    fn unknown_artifact_yields_empty_response() {
        let config = loopback_config();
        let store = InMemoryArtifactStore::new();
        let binding = ArtifactBinding::new(&config, &store);
        let resolve = ArtifactResolve::new("idp1", Artifact::new(1, "idp1").encode());
        let envelope = binding.respond_to_artifact_resolve(&resolve).unwrap();
        let response = SoapBindingParser::from_xml(&envelope)
            .unwrap()
            .artifact_response()
            .unwrap();
        assert!(response.status.is_success());
        assert_eq!(response.in_response_to.as_deref(), Some(resolve.id.as_str()));
        assert!(response.message.is_none());
    }
}
