//! Parsing and validation of `vesta.toml` configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`VestaConfig`] describing the kernel to specialize, the toolchain, the
//! local cache, and peer exchange settings.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;
