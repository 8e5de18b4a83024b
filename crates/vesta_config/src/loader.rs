//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{VestaConfig, WaitMode};
use std::path::{Path, PathBuf};

/// The configuration file name looked up in a project directory.
pub const CONFIG_FILE: &str = "vesta.toml";

/// Loads and validates a `vesta.toml` configuration from a file or a
/// directory containing one.
///
/// Relative paths in the file are resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<VestaConfig, ConfigError> {
    let config_path = if path.is_dir() {
        path.join(CONFIG_FILE)
    } else {
        path.to_path_buf()
    };
    let content = std::fs::read_to_string(&config_path)?;
    let mut config = load_config_from_str(&content)?;
    let base = config_path.parent().unwrap_or(Path::new("."));
    resolve_paths(&mut config, base);
    Ok(config)
}

/// Parses and validates a `vesta.toml` configuration from a string.
///
/// Paths are left as written.
pub fn load_config_from_str(content: &str) -> Result<VestaConfig, ConfigError> {
    let config: VestaConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn rebase(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn resolve_paths(config: &mut VestaConfig, base: &Path) {
    for source in &mut config.kernel.sources {
        *source = rebase(base, Path::new(source.as_str()))
            .to_string_lossy()
            .into_owned();
    }
    config.compiler.output_dir = rebase(base, &config.compiler.output_dir);
    config.cache.dir = rebase(base, &config.cache.dir);
    config.peer.download_dir = rebase(base, &config.peer.download_dir);
}

/// Validates that required fields are present and values are consistent.
fn validate_config(config: &VestaConfig) -> Result<(), ConfigError> {
    if config.kernel.name.is_empty() {
        return Err(ConfigError::MissingField("kernel.name".to_string()));
    }
    if config.kernel.sources.is_empty() {
        return Err(ConfigError::MissingField("kernel.sources".to_string()));
    }
    if config.kernel.symbols.is_empty() {
        return Err(ConfigError::MissingField("kernel.symbols".to_string()));
    }
    if config.compiler.program.is_empty() {
        return Err(ConfigError::MissingField("compiler.program".to_string()));
    }
    if config.peer.transfers == 0 {
        return Err(ConfigError::ValidationError(
            "peer.transfers must be at least 1".to_string(),
        ));
    }
    if config.peer.wait_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "peer.wait_timeout_secs must be positive".to_string(),
        ));
    }
    if config.peer.fetch_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "peer.fetch_timeout_secs must be positive".to_string(),
        ));
    }
    if config.peer.wait == WaitMode::Poll && config.peer.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "peer.poll_interval_ms must be positive when polling".to_string(),
        ));
    }
    if config.peer.node_id.as_deref() == Some("") {
        return Err(ConfigError::ValidationError(
            "peer.node_id must not be empty".to_string(),
        ));
    }
    Ok(())
}
