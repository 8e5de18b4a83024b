//! Shared foundational types used across the Vesta specialization cache.
//!
//! This crate provides the specialization key that selects a compiled
//! variant, the compilation option model passed verbatim to a backend, and
//! the content hash used for fingerprints and transfer integrity.

#![warn(missing_docs)]

pub mod hash;
pub mod key;
pub mod option;

pub use hash::{ContentHash, ContentHasher};
pub use key::{InvalidKey, SpecKey};
pub use option::CompileOption;
