//! Artifact store.
//!
//! Holds signed SAML messages between the moment an artifact is issued and
//! the moment the peer resolves it over the back channel.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::{CacheError, CacheResult};

/// Store for messages awaiting artifact resolution.
///
/// Entries are single use: a successful [`take`](ArtifactStore::take)
/// removes the entry, and expired entries are never returned. Entries that
/// are never resolved must not outlive their TTL for long; implementations
/// reclaim them without relying on callers of
/// [`purge_expired`](ArtifactStore::purge_expired).
pub trait ArtifactStore: Send + Sync {
    /// Stores `message` under `artifact` for at most `ttl`.
    ///
    /// Fails with [`CacheError::Conflict`] if the artifact is already pending.
    fn insert(&self, artifact: &str, message: String, ttl: Duration) -> CacheResult<()>;

    /// Removes and returns the message stored under `artifact`, if it has
    /// not expired.
    fn take(&self, artifact: &str) -> CacheResult<Option<String>>;

    /// Drops expired entries, returning how many were removed.
    fn purge_expired(&self) -> CacheResult<usize>;
}

#[derive(Debug)]
struct PendingMessage {
    message: String,
    expires_at: Instant,
}

impl PendingMessage {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory artifact store backed by a concurrent map.
///
/// Every insert first sweeps expired entries, so the map holds at most the
/// artifacts issued within the longest TTL.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    entries: DashMap<String, PendingMessage>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn insert(&self, artifact: &str, message: String, ttl: Duration) -> CacheResult<()> {
        let purged = self.purge_expired()?;
        if purged > 0 {
            tracing::trace!(purged, "expired artifacts dropped");
        }

        let now = Instant::now();
        let entry = PendingMessage {
            message,
            expires_at: now + ttl,
        };

        match self.entries.entry(artifact.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now) {
                    return Err(CacheError::Conflict(artifact.to_string()));
                }
                occupied.insert(entry);
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
        tracing::trace!(artifact, ttl_secs = ttl.as_secs(), "artifact stored");
        Ok(())
    }

    fn take(&self, artifact: &str) -> CacheResult<Option<String>> {
        let Some((_, entry)) = self.entries.remove(artifact) else {
            return Ok(None);
        };
        if entry.is_expired(Instant::now()) {
            tracing::debug!(artifact, "artifact expired before resolution");
            return Ok(None);
        }
        Ok(Some(entry.message))
    }

    fn purge_expired(&self) -> CacheResult<usize> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}
