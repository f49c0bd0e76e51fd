//! Back-channel SOAP transport.

use std::time::Duration;

use super::soap::{SoapEnvelope, SOAP_CONTENT_TYPE};
use crate::config::ArtifactResolutionSettings;
use crate::error::{SamlError, SamlResult};

/// Sends a SOAP envelope and returns the raw response body.
///
/// Implementations must not retry; a failed call is reported to the caller.
pub trait SoapClient: Send + Sync {
    /// POSTs `envelope` to `url`, authenticating with `credentials`.
    fn send(
        &self,
        url: &str,
        envelope: &str,
        credentials: &ArtifactResolutionSettings,
    ) -> SamlResult<Vec<u8>>;
}

/// Blocking HTTP client for SOAP calls.
#[derive(Debug, Clone)]
pub struct HttpSoapClient {
    timeout: Duration,
}

impl HttpSoapClient {
    /// Creates a client with a per-request timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn client(
        &self,
        credentials: &ArtifactResolutionSettings,
    ) -> SamlResult<reqwest::blocking::Client> {
        let mut builder = reqwest::blocking::Client::builder().timeout(self.timeout);
        if let Some(pem) = &credentials.client_identity_pem {
            let identity = reqwest::Identity::from_pem(pem.as_bytes()).map_err(|e| {
                SamlError::Configuration(format!("invalid client identity: {e}"))
            })?;
            builder = builder.identity(identity);
        }
        Ok(builder.build()?)
    }
}

impl SoapClient for HttpSoapClient {
    fn send(
        &self,
        url: &str,
        envelope: &str,
        credentials: &ArtifactResolutionSettings,
    ) -> SamlResult<Vec<u8>> {
        let mut request = self
            .client(credentials)?
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .header("SOAPAction", SoapEnvelope::ACTION)
            .body(envelope.to_string());
        if let Some(auth) = &credentials.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        tracing::debug!(url, "sending SOAP request");
        let response = request.send()?;
        let status = response.status();
        // SOAP faults arrive with 500 and are reported from the body
        if !status.is_success() && status != reqwest::StatusCode::INTERNAL_SERVER_ERROR {
            return Err(SamlError::Transport(format!("{url} answered {status}")));
        }
        Ok(response.bytes()?.to_vec())
    }
}
