//! Shared configuration snapshot with metadata refresh.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};

use super::Configuration;
use crate::error::{SamlError, SamlResult};
use crate::metadata::EntityMetadata;

/// Where identity provider metadata is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataSource {
    /// A local document, reloaded when its modification time changes.
    File(PathBuf),
    /// A remote document, fetched on every refresh.
    Url(String),
}

/// Reads a metadata document.
pub fn fetch_metadata(source: &MetadataSource, timeout: Duration) -> SamlResult<String> {
    match source {
        MetadataSource::File(path) => std::fs::read_to_string(path).map_err(|e| {
            SamlError::Configuration(format!("cannot read metadata {}: {e}", path.display()))
        }),
        MetadataSource::Url(url) => {
            let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
            let response = client.get(url).send()?.error_for_status()?;
            Ok(response.text()?)
        }
    }
}

fn modified(path: &PathBuf) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Holds the current [`Configuration`] snapshot.
///
/// Readers clone the `Arc` and keep working on their snapshot while a
/// refresh builds and swaps in a new one. Refreshes are serialized by the
/// mutex guarding the file timestamp cache.
#[derive(Debug)]
pub struct ConfigurationHandle {
    current: RwLock<Arc<Configuration>>,
    timestamps: Mutex<HashMap<PathBuf, SystemTime>>,
}

impl ConfigurationHandle {
    /// Wraps a snapshot, recording the timestamps of its metadata files.
    pub fn new(config: Configuration) -> Self {
        let timestamps = config
            .identity_providers
            .iter()
            .filter_map(|idp| match &idp.metadata_source {
                Some(MetadataSource::File(path)) => {
                    modified(path).map(|time| (path.clone(), time))
                }
                _ => None,
            })
            .collect();
        Self {
            current: RwLock::new(Arc::new(config)),
            timestamps: Mutex::new(timestamps),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<Configuration> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the snapshot.
    pub fn replace(&self, config: Configuration) -> SamlResult<()> {
        config.validate()?;
        let _guard = self.timestamps.lock();
        *self.current.write() = Arc::new(config);
        Ok(())
    }

    /// Reloads metadata whose source changed and swaps in a new snapshot.
    ///
    /// Returns the number of identity providers that were updated. On error
    /// the current snapshot stays in place.
    pub fn refresh_metadata(&self) -> SamlResult<usize> {
        let mut timestamps = self.timestamps.lock();
        let snapshot = self.current();

        let mut next = (*snapshot).clone();
        let mut seen = HashMap::new();
        let mut updated = 0;

        for idp in &mut next.identity_providers {
            let Some(source) = idp.metadata_source.clone() else {
                continue;
            };
            if let MetadataSource::File(path) = &source {
                let Some(time) = modified(path) else {
                    tracing::warn!(idp = %idp.id, path = %path.display(), "metadata file missing");
                    continue;
                };
                if timestamps.get(path) == Some(&time) {
                    continue;
                }
                seen.insert(path.clone(), time);
            }

            let metadata = EntityMetadata::parse(&fetch_metadata(&source, next.http_timeout)?)?;
            let previous = idp.id.clone();
            *idp = idp.clone().with_metadata(metadata);
            tracing::debug!(idp = %idp.id, previous = %previous, "identity provider metadata refreshed");
            updated += 1;
        }

        if updated > 0 {
            next.validate()?;
            *self.current.write() = Arc::new(next);
        }
        timestamps.extend(seen);
        Ok(updated)
    }
}
