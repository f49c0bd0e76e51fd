//! SAML 2.0 Service Provider protocol engine.
//!
//! This crate implements the SP side of the SAML 2.0 Web Browser SSO and
//! Single Logout profiles:
//!
//! - **Message model** - typed protocol messages and assertions with XML
//!   serialization and parsing
//! - **XML signature** - enveloped XML-DSig signing and verification with
//!   disjunctive trust over candidate keys
//! - **Bindings** - HTTP Redirect, HTTP POST and HTTP Artifact/SOAP
//! - **Validation** - the SAML Core conformance rules for assertions,
//!   subjects, NameIDs, statements, conditions and time windows
//! - **Orchestration** - login, logout and attribute query flows driven by
//!   an immutable configuration snapshot
//!
//! # Architecture
//!
//! - [`xml`] - namespace-aware XML tree and canonicalization
//! - [`types`] - protocol messages and assertion model
//! - [`artifact`] - binary artifact codec
//! - [`signature`] - XML-DSig and redirect query signatures
//! - [`bindings`] - binding parsers and builders
//! - [`validation`] - the validator hierarchy
//! - [`config`] - configuration file, snapshot and metadata refresh
//! - [`metadata`] - federation metadata parsing and SP metadata generation
//! - [`selection`] - identity provider and endpoint selection
//! - [`protocol`] - login, logout and attribute query handlers
//! - [`extensions`] - registry of pluggable validators, mappers and token accessors
//!
//! # Example
//!
//! ```rust,ignore
//! use saml2_protocol::config::{Configuration, ConfigurationHandle};
//! use saml2_protocol::extensions::ExtensionRegistry;
//! use saml2_protocol::protocol::{InboundRequest, LoginHandler, SamlState};
//!
//! let registry = ExtensionRegistry::new();
//! let config = Configuration::from_file("saml2.toml", &registry)?;
//! let state = SamlState::in_memory(ConfigurationHandle::new(config));
//!
//! let action = LoginHandler::new(&state).handle(&request, &session_id)?;
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Profiles](https://docs.oasis-open.org/security/saml/v2.0/saml-profiles-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod artifact;
pub mod bindings;
pub mod config;
pub mod error;
pub mod extensions;
pub mod metadata;
pub mod protocol;
pub mod selection;
pub mod signature;
pub mod types;
pub mod validation;
pub mod xml;

pub use error::{SamlError, SamlResult};
pub use types::*;
