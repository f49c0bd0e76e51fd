//! Shared protocol state.

use std::sync::Arc;

use saml2_cache::{ArtifactStore, InMemoryArtifactStore, InMemorySessionStore, SessionStore};

use crate::bindings::{HttpSoapClient, SoapClient};
use crate::config::ConfigurationHandle;
use crate::selection::SelectionStrategy;

/// Everything the protocol handlers share across requests.
///
/// Cloning is cheap; all parts are reference counted.
#[derive(Clone)]
pub struct SamlState {
    config: Arc<ConfigurationHandle>,
    artifacts: Arc<dyn ArtifactStore>,
    sessions: Arc<dyn SessionStore>,
    soap_client: Arc<dyn SoapClient>,
    selection_strategy: Option<Arc<dyn SelectionStrategy>>,
}

impl SamlState {
    /// Creates a state from its parts.
    pub fn new(
        config: ConfigurationHandle,
        artifacts: Arc<dyn ArtifactStore>,
        sessions: Arc<dyn SessionStore>,
        soap_client: Arc<dyn SoapClient>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            artifacts,
            sessions,
            soap_client,
            selection_strategy: None,
        }
    }

    /// In-memory stores and an HTTP SOAP client using the configured
    /// timeout.
    pub fn in_memory(config: ConfigurationHandle) -> Self {
        let timeout = config.current().http_timeout;
        Self::new(
            config,
            Arc::new(InMemoryArtifactStore::new()),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(HttpSoapClient::new(timeout)),
        )
    }

    /// Sets the strategy consulted when no other selection rule applies.
    #[must_use]
    pub fn with_selection_strategy(mut self, strategy: Arc<dyn SelectionStrategy>) -> Self {
        self.selection_strategy = Some(strategy);
        self
    }

    /// Replaces the SOAP client.
    #[must_use]
    pub fn with_soap_client(mut self, client: Arc<dyn SoapClient>) -> Self {
        self.soap_client = client;
        self
    }

    /// The configuration handle.
    pub fn config(&self) -> &ConfigurationHandle {
        &self.config
    }

    /// The artifact store.
    pub fn artifacts(&self) -> &dyn ArtifactStore {
        self.artifacts.as_ref()
    }

    /// The session store.
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    /// The SOAP client.
    pub fn soap_client(&self) -> &dyn SoapClient {
        self.soap_client.as_ref()
    }

    /// The selection strategy, if any.
    pub fn selection_strategy(&self) -> Option<&dyn SelectionStrategy> {
        self.selection_strategy.as_deref()
    }
}
