//! In-process specialization cache.
//!
//! The [`Registry`] maps a [`SpecKey`](vesta_common::SpecKey) to at most one
//! live artifact, builds on a miss, and re-links cached artifacts on every
//! lookup so folded entries come back without recompiling. An optional
//! on-disk [`RegistryManifest`] lets a fresh process re-link binaries built
//! by an earlier one.

#![warn(missing_docs)]

pub mod error;
pub mod manifest;
pub mod registry;
pub mod slots;

pub use error::CacheError;
pub use manifest::{ManifestEntry, RegistryManifest};
pub use registry::{Registry, RegistryStats};
pub use slots::KeyedSlots;

/// Version string recorded in manifests; a mismatch discards the manifest.
pub const VESTA_VERSION: &str = env!("CARGO_PKG_VERSION");
