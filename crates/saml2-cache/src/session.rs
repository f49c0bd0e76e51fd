//! Session correlation store.
//!
//! The protocol flows remember a handful of values per browser session
//! between the outbound request and the inbound response. The host decides
//! what a session identifier is; this store only keys on it.

use std::collections::HashMap;

use dashmap::DashMap;

use crate::error::CacheResult;

/// Per-session key/value store.
pub trait SessionStore: Send + Sync {
    /// Returns the value stored under `key` for the session.
    fn get(&self, session_id: &str, key: &str) -> CacheResult<Option<String>>;

    /// Stores a value, replacing any previous one.
    fn set(&self, session_id: &str, key: &str, value: &str) -> CacheResult<()>;

    /// Removes and returns a value.
    fn remove(&self, session_id: &str, key: &str) -> CacheResult<Option<String>>;

    /// Removes every value of the session.
    fn clear(&self, session_id: &str) -> CacheResult<()>;
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, HashMap<String, String>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the session has any stored values.
    #[must_use]
    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|values| !values.is_empty())
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session_id: &str, key: &str) -> CacheResult<Option<String>> {
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|values| values.get(key).cloned()))
    }

    fn set(&self, session_id: &str, key: &str, value: &str) -> CacheResult<()> {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, session_id: &str, key: &str) -> CacheResult<Option<String>> {
        Ok(self
            .sessions
            .get_mut(session_id)
            .and_then(|mut values| values.remove(key)))
    }

    fn clear(&self, session_id: &str) -> CacheResult<()> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_scoped_by_session() {
        let store = InMemorySessionStore::new();
        store.set("s1", "idp", "idp1").unwrap();
        store.set("s2", "idp", "idp2").unwrap();

        assert_eq!(store.get("s1", "idp").unwrap().as_deref(), Some("idp1"));
        assert_eq!(store.get("s2", "idp").unwrap().as_deref(), Some("idp2"));
        assert_eq!(store.get("s3", "idp").unwrap(), None);
    }

    #[test]
    fn remove_and_clear() {
        let store = InMemorySessionStore::new();
        store.set("s1", "request", "id123").unwrap();
        store.set("s1", "name_id", "alice").unwrap();

        assert_eq!(store.remove("s1", "request").unwrap().as_deref(), Some("id123"));
        assert_eq!(store.remove("s1", "request").unwrap(), None);
        assert!(store.has_session("s1"));

        store.clear("s1").unwrap();
        assert!(!store.has_session("s1"));
    }
}
