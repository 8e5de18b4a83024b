//! Registry manifest recording binaries built by earlier processes.
//!
//! The manifest is stored as `manifest.json` in the cache directory. Each
//! record ties a key to the binary built for it and the fingerprint of the
//! request that produced it, so a later process can re-link the binary
//! instead of recompiling when the request is unchanged.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vesta_common::{ContentHash, SpecKey};

use crate::error::CacheError;

/// Name of the manifest file within the cache directory.
const MANIFEST_FILE: &str = "manifest.json";

/// Top-level manifest of recorded binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryManifest {
    /// Vesta version that wrote this manifest. Discarded on version change.
    pub vesta_version: String,

    /// One record per key, kept sorted by key.
    pub entries: Vec<ManifestEntry>,
}

/// A binary previously built for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// The specialization key.
    pub key: SpecKey,
    /// The binary on disk.
    pub binary: PathBuf,
    /// Fingerprint of the request that produced the binary.
    pub fingerprint: ContentHash,
    /// Entry symbols the binary exposes.
    pub symbols: Vec<String>,
}

impl RegistryManifest {
    /// Creates an empty manifest for the given version.
    pub fn new(vesta_version: &str) -> Self {
        Self {
            vesta_version: vesta_version.to_string(),
            entries: Vec::new(),
        }
    }

    /// Loads the manifest from the cache directory, returning `None` if
    /// the file doesn't exist or can't be parsed.
    pub fn load(cache_dir: &Path) -> Option<Self> {
        let path = cache_dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Loads a compatible manifest or starts an empty one.
    pub fn load_or_create(cache_dir: &Path, vesta_version: &str) -> Self {
        Self::load(cache_dir)
            .filter(|m| m.is_compatible(vesta_version))
            .unwrap_or_else(|| Self::new(vesta_version))
    }

    /// Saves the manifest to the cache directory, creating it if needed.
    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(cache_dir).map_err(|e| CacheError::Io {
            path: cache_dir.to_path_buf(),
            source: e,
        })?;
        let path = cache_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| CacheError::Io { path, source: e })
    }

    /// Returns `true` if this manifest was written by a compatible version.
    pub fn is_compatible(&self, current_version: &str) -> bool {
        self.vesta_version == current_version
    }

    /// The record for `key`, if any.
    pub fn get(&self, key: SpecKey) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Inserts or replaces the record for `entry.key`.
    pub fn insert(&mut self, entry: ManifestEntry) {
        match self.entries.binary_search_by(|e| e.key.cmp(&entry.key)) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Removes the record for `key`, returning it.
    pub fn remove(&mut self, key: SpecKey) -> Option<ManifestEntry> {
        let i = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.remove(i))
    }
}
