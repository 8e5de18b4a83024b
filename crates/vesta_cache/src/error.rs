//! Error types for cache operations.

use std::path::PathBuf;

use vesta_common::SpecKey;
use vesta_compiler::BuildFailure;

/// Errors that can occur during cache operations.
///
/// Manifest problems are fail-safe and surface only from explicit
/// [`RegistryManifest::save`](crate::RegistryManifest::save) calls; a
/// failed build is the one error `resolve` returns.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Building the variant for a key failed. Nothing was cached.
    #[error("failed to build variant {key}: {source}")]
    Build {
        /// The key whose build failed.
        key: SpecKey,
        /// The backend's reason.
        source: BuildFailure,
    },

    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}
