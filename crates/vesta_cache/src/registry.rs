//! The version registry: one live artifact per specialization key.
//!
//! `Registry` ties together the per-key slots, the compilation backend, and
//! the optional on-disk manifest. A lookup re-links a cached artifact before
//! returning it, a miss builds exactly once even under concurrent callers,
//! and a failed build leaves no entry behind.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use vesta_common::SpecKey;
use vesta_compiler::{Backend, BuildRequest, Linkable};

use crate::error::CacheError;
use crate::manifest::{ManifestEntry, RegistryManifest};
use crate::slots::KeyedSlots;
use crate::VESTA_VERSION;

/// Counters describing how lookups were satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Backend `build` calls that succeeded.
    pub builds: u64,
    /// Lookups served from a cached entry.
    pub hits: u64,
    /// Hits where the entry had been folded and was linked again.
    pub relinks: u64,
    /// Misses served by loading a binary recorded in the manifest.
    pub reloads: u64,
}

#[derive(Default)]
struct Counters {
    builds: AtomicU64,
    hits: AtomicU64,
    relinks: AtomicU64,
    reloads: AtomicU64,
}

struct Persisted {
    cache_dir: PathBuf,
    manifest: Mutex<RegistryManifest>,
}

/// In-process specialization cache.
///
/// Construct one per component that issues `resolve` calls and drop it at
/// shutdown; there is no process-wide instance.
pub struct Registry<B: Backend> {
    backend: Arc<B>,
    slots: KeyedSlots<B::Artifact>,
    persisted: Option<Persisted>,
    counters: Counters,
}

impl<B: Backend> Registry<B> {
    /// Creates an empty registry that never touches the disk itself.
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            slots: KeyedSlots::new(),
            persisted: None,
            counters: Counters::default(),
        }
    }

    /// Creates a registry backed by a manifest in `cache_dir`.
    ///
    /// An existing manifest from a compatible version is loaded; anything
    /// else starts empty.
    pub fn with_manifest(backend: Arc<B>, cache_dir: &Path) -> Self {
        let manifest = RegistryManifest::load_or_create(cache_dir, VESTA_VERSION);
        Self {
            persisted: Some(Persisted {
                cache_dir: cache_dir.to_path_buf(),
                manifest: Mutex::new(manifest),
            }),
            ..Self::new(backend)
        }
    }

    /// The backend used for misses.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Returns a linked artifact for `key`, building it on a miss.
    ///
    /// A cached entry is re-linked first, which is a no-op if it is already
    /// linked. If re-linking fails (for example the binary was deleted) the
    /// entry is dropped and rebuilt. A failed build returns
    /// [`CacheError::Build`] and leaves the key absent.
    pub fn resolve(
        &self,
        key: SpecKey,
        request: &BuildRequest,
    ) -> Result<Arc<B::Artifact>, CacheError> {
        let slot = self.slots.slot(key);
        let mut entry = slot.lock();

        if let Some(artifact) = entry.clone() {
            let was_linked = artifact.is_linked();
            match artifact.link() {
                Ok(()) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    if !was_linked {
                        self.counters.relinks.fetch_add(1, Ordering::Relaxed);
                    }
                    return Ok(artifact);
                }
                Err(e) => {
                    tracing::warn!(%key, error = %e, "re-link failed, rebuilding");
                    artifact.fold();
                    *entry = None;
                }
            }
        }

        if let Some(artifact) = self.load_recorded(key, request) {
            let artifact = Arc::new(artifact);
            *entry = Some(artifact.clone());
            self.counters.reloads.fetch_add(1, Ordering::Relaxed);
            return Ok(artifact);
        }

        tracing::debug!(%key, "registry miss, building");
        let artifact = self
            .backend
            .build(request)
            .map_err(|source| CacheError::Build { key, source })?;
        let artifact = Arc::new(artifact);
        self.counters.builds.fetch_add(1, Ordering::Relaxed);
        self.record(key, request, artifact.as_ref());
        *entry = Some(artifact.clone());
        Ok(artifact)
    }

    /// Returns the cached artifact for `key` as-is, without re-linking.
    pub fn peek(&self, key: SpecKey) -> Option<Arc<B::Artifact>> {
        self.slots.get(key)
    }

    /// Releases the loaded code for `key` but keeps the entry.
    ///
    /// Returns `false` if the key is absent. Folding twice is harmless.
    pub fn fold(&self, key: SpecKey) -> bool {
        match self.slots.get(key) {
            Some(artifact) => {
                artifact.fold();
                true
            }
            None => false,
        }
    }

    /// Folds every cached artifact.
    pub fn fold_all(&self) {
        for artifact in self.slots.values() {
            artifact.fold();
        }
    }

    /// Removes the entry for `key` and releases its loaded code.
    ///
    /// The binary stays on disk but the manifest record is dropped, so the
    /// next `resolve` for this key compiles from scratch.
    pub fn invalidate(&self, key: SpecKey) -> bool {
        let removed = self.slots.take(key);
        if let Some(artifact) = &removed {
            artifact.fold();
        }
        if let Some(persisted) = &self.persisted {
            let mut manifest = persisted.manifest.lock();
            if manifest.remove(key).is_some() {
                if let Err(e) = manifest.save(&persisted.cache_dir) {
                    tracing::warn!(%key, error = %e, "failed to save registry manifest");
                }
            }
        }
        removed.is_some()
    }

    /// Whether `key` has a cached entry.
    pub fn contains(&self, key: SpecKey) -> bool {
        self.slots.contains(key)
    }

    /// Cached keys in key order.
    pub fn keys(&self) -> Vec<SpecKey> {
        self.slots.keys()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// A snapshot of the lookup counters.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            builds: self.counters.builds.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            relinks: self.counters.relinks.load(Ordering::Relaxed),
            reloads: self.counters.reloads.load(Ordering::Relaxed),
        }
    }

    fn load_recorded(&self, key: SpecKey, request: &BuildRequest) -> Option<B::Artifact> {
        let persisted = self.persisted.as_ref()?;
        let recorded = persisted.manifest.lock().get(key).cloned()?;
        let fingerprint = request.fingerprint().ok()?;
        if recorded.fingerprint != fingerprint || !recorded.binary.is_file() {
            return None;
        }
        match self.backend.load(&recorded.binary, &recorded.symbols) {
            Ok(artifact) => {
                tracing::debug!(%key, binary = %recorded.binary.display(), "re-linked recorded binary");
                Some(artifact)
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "recorded binary unusable, rebuilding");
                None
            }
        }
    }

    fn record(&self, key: SpecKey, request: &BuildRequest, artifact: &B::Artifact) {
        let Some(persisted) = &self.persisted else {
            return;
        };
        let fingerprint = match request.fingerprint() {
            Ok(fp) => fp,
            Err(e) => {
                tracing::warn!(%key, error = %e, "cannot fingerprint request, not recording");
                return;
            }
        };
        let mut manifest = persisted.manifest.lock();
        manifest.insert(ManifestEntry {
            key,
            binary: artifact.binary_path().to_path_buf(),
            fingerprint,
            symbols: artifact.symbol_names().to_vec(),
        });
        if let Err(e) = manifest.save(&persisted.cache_dir) {
            tracing::warn!(%key, error = %e, "failed to save registry manifest");
        }
    }
}
