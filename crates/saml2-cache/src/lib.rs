//! # saml2-cache
//!
//! Store abstractions used by the SAML protocol flows.
//!
//! - [`ArtifactStore`] - pending signed messages keyed by artifact, single use
//!   with a bounded lifetime
//! - [`SessionStore`] - per-session correlation values (selected IdP, NameID,
//!   session index, pending request IDs)
//!
//! Both traits are synchronous and `Send + Sync`; the in-memory implementations
//! are safe to share between request threads.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use saml2_cache::{ArtifactStore, InMemoryArtifactStore};
//!
//! let store = InMemoryArtifactStore::new();
//! store.insert("AAQAAQ==", "<samlp:AuthnRequest/>".to_string(), Duration::from_secs(60)).unwrap();
//! assert!(store.take("AAQAAQ==").unwrap().is_some());
//! assert!(store.take("AAQAAQ==").unwrap().is_none());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod artifact;
pub mod error;
pub mod session;

pub use artifact::{ArtifactStore, InMemoryArtifactStore};
pub use error::{CacheError, CacheResult};
pub use session::{InMemorySessionStore, SessionStore};
