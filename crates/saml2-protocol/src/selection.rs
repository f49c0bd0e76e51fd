//! Identity provider and endpoint selection.
//!
//! [`select_identity_provider`] applies a fixed precedence, first match
//! wins:
//!
//! 1. the `cidp` query parameter naming a configured identity provider
//! 2. the common domain cookie `_saml_idp`, last entry first
//! 3. the only configured identity provider, if it has metadata
//! 4. the identity provider flagged `default`
//! 5. a redirect to the configured selection page
//! 6. the caller's [`SelectionStrategy`], which may select nothing
//!
//! [`determine_endpoint_configuration`] then picks the binding and URL of
//! the chosen identity provider's endpoint.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::{Configuration, EndpointKind, IdentityProvider, IdentityProviderEndpoint};
use crate::error::{SamlError, SamlResult};
use crate::extensions::{Extension, TokenAccessor};
use crate::metadata::{endpoint_for_binding, MetadataEndpoint};
use crate::protocol::HttpRequest;
use crate::types::SamlBinding;

/// Query parameter naming the identity provider to use.
pub const IDP_QUERY_PARAM: &str = "cidp";

/// Common domain cookie name.
pub const COMMON_DOMAIN_COOKIE: &str = "_saml_idp";

/// Picks an identity provider when the built-in rules do not.
pub trait SelectionStrategy: Send + Sync {
    /// Returns the identity provider to use, or `None`.
    fn select<'c>(
        &self,
        config: &'c Configuration,
        request: &dyn HttpRequest,
    ) -> Option<&'c IdentityProvider>;
}

/// Result of identity provider selection.
#[derive(Debug)]
pub enum IdentityProviderSelection<'c> {
    /// Use this identity provider.
    Selected(&'c IdentityProvider),
    /// Send the user to the selection page.
    Redirect(String),
    /// Nothing selected.
    None,
}

/// Decodes the common domain cookie into entity IDs, in cookie order.
///
/// Entries that are not valid base64 UTF-8 are skipped.
#[must_use]
pub fn parse_common_domain_cookie(value: &str) -> Vec<String> {
    let decoded = urlencoding::decode(value).map_or_else(|_| value.to_string(), |v| v.into_owned());
    decoded
        .split_whitespace()
        .filter_map(|entry| STANDARD.decode(entry).ok())
        .filter_map(|bytes| String::from_utf8(bytes).ok())
        .collect()
}

/// Applies the selection precedence.
pub fn select_identity_provider<'c>(
    config: &'c Configuration,
    request: &dyn HttpRequest,
    strategy: Option<&dyn SelectionStrategy>,
) -> IdentityProviderSelection<'c> {
    if let Some(idp) = request
        .query_param(IDP_QUERY_PARAM)
        .and_then(|id| config.identity_provider(&id))
    {
        tracing::debug!(idp = %idp.id, "identity provider selected by query parameter");
        return IdentityProviderSelection::Selected(idp);
    }

    if config.common_domain.enabled {
        if let Some(idp) = request.cookie(COMMON_DOMAIN_COOKIE).and_then(|cookie| {
            parse_common_domain_cookie(&cookie)
                .iter()
                .rev()
                .find_map(|id| config.identity_provider(id))
        }) {
            tracing::debug!(idp = %idp.id, "identity provider selected by common domain cookie");
            return IdentityProviderSelection::Selected(idp);
        }
    }

    if let [idp] = config.identity_providers.as_slice() {
        if idp.has_metadata() {
            tracing::debug!(idp = %idp.id, "only configured identity provider selected");
            return IdentityProviderSelection::Selected(idp);
        }
    }

    if let Some(idp) = config.identity_providers.iter().find(|idp| idp.default) {
        tracing::debug!(idp = %idp.id, "default identity provider selected");
        return IdentityProviderSelection::Selected(idp);
    }

    if let Some(url) = &config.selection.selection_url {
        tracing::debug!(url = %url, "redirecting to identity provider selection");
        return IdentityProviderSelection::Redirect(url.clone());
    }

    match strategy.and_then(|s| s.select(config, request)) {
        Some(idp) => IdentityProviderSelection::Selected(idp),
        None => IdentityProviderSelection::None,
    }
}

/// An endpoint chosen for one operation.
#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    /// Binding to use.
    pub binding: SamlBinding,
    /// Destination URL.
    pub url: String,
    /// Artifact endpoint index.
    pub index: Option<u16>,
    /// Token accessor of the configured endpoint.
    pub token_accessor: Option<Extension<dyn TokenAccessor>>,
}

/// Chooses binding and URL.
///
/// A configured binding wins. Otherwise `default_binding` is used if the
/// metadata advertises it, else the other front-channel binding. A
/// configured URL wins over metadata; without one, the metadata endpoint
/// for the chosen binding supplies it.
pub fn determine_endpoint_configuration(
    default_binding: SamlBinding,
    configured: Option<&IdentityProviderEndpoint>,
    metadata_endpoints: &[MetadataEndpoint],
) -> SamlResult<ResolvedEndpoint> {
    let binding = match configured.and_then(|e| e.binding) {
        Some(binding) => binding,
        None if endpoint_for_binding(metadata_endpoints, default_binding).is_some() => {
            default_binding
        }
        None => match default_binding {
            SamlBinding::Post => SamlBinding::Redirect,
            _ => SamlBinding::Post,
        },
    };

    let url = match configured.map(|e| e.url.trim()).filter(|url| !url.is_empty()) {
        Some(url) => url.to_string(),
        None => endpoint_for_binding(metadata_endpoints, binding)
            .map(|e| e.location.clone())
            .ok_or_else(|| {
                SamlError::format(format!(
                    "No IdentityProvider supporting SAML binding {} found in metadata",
                    binding.uri()
                ))
            })?,
    };

    Ok(ResolvedEndpoint {
        binding,
        url,
        index: configured.and_then(|e| e.index),
        token_accessor: configured.and_then(|e| e.token_accessor.clone()),
    })
}

/// Single sign-on endpoint of `idp`, Redirect by default.
pub fn sign_on_endpoint(idp: &IdentityProvider) -> SamlResult<ResolvedEndpoint> {
    determine_endpoint_configuration(
        SamlBinding::Redirect,
        idp.endpoint(EndpointKind::SignOn),
        idp.metadata
            .as_deref()
            .map_or(&[][..], |md| md.single_sign_on_services.as_slice()),
    )
}

/// Single logout endpoint of `idp`, Redirect by default.
pub fn logout_endpoint(idp: &IdentityProvider) -> SamlResult<ResolvedEndpoint> {
    determine_endpoint_configuration(
        SamlBinding::Redirect,
        idp.endpoint(EndpointKind::Logout),
        idp.metadata
            .as_deref()
            .map_or(&[][..], |md| md.single_logout_services.as_slice()),
    )
}

/// URL of the artifact resolution service of `idp` for an artifact's
/// endpoint index.
pub fn artifact_resolution_url(idp: &IdentityProvider, endpoint_index: i16) -> SamlResult<String> {
    let index = u16::try_from(endpoint_index).unwrap_or_default();
    idp.metadata
        .as_deref()
        .and_then(|md| md.artifact_resolution_endpoint(index))
        .map(|e| e.location.clone())
        .ok_or_else(|| {
            SamlError::Configuration(format!(
                "identity provider {} has no artifact resolution service",
                idp.id
            ))
        })
}

/// URL of the SOAP attribute service of `idp`.
pub fn attribute_service_url(idp: &IdentityProvider) -> SamlResult<String> {
    idp.metadata
        .as_deref()
        .and_then(|md| md.attribute_service())
        .map(|e| e.location.clone())
        .ok_or_else(|| {
            SamlError::Configuration(format!(
                "identity provider {} has no SOAP attribute service",
                idp.id
            ))
        })
}
