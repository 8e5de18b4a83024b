//! Shared helpers for the subcommands: configuration, logging, backends,
//! and peer settings.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use vesta_compiler::SystemCompiler;
use vesta_config::{LogLevel, PeerConfig, VestaConfig, WaitMode, CONFIG_FILE};
use vesta_peer::{PeerOptions, WaitStrategy};

use crate::{GlobalArgs, PeerArgs};

/// The environment variable overriding the log filter.
pub const LOG_ENV: &str = "VESTA_LOG";

/// The config path named by `--config`, or `vesta.toml` in the current
/// directory.
pub fn config_path(global: &GlobalArgs) -> PathBuf {
    match &global.config {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(CONFIG_FILE),
    }
}

/// Loads the configuration and starts logging at its level.
pub fn load(global: &GlobalArgs) -> Result<VestaConfig, Box<dyn std::error::Error>> {
    let config = vesta_config::load_config(&config_path(global))?;
    init_logging(global, config.log.level);
    Ok(config)
}

/// Like [`load`], but a missing default `vesta.toml` is not an error.
///
/// An explicit `--config` must always load.
pub fn load_optional(
    global: &GlobalArgs,
) -> Result<Option<VestaConfig>, Box<dyn std::error::Error>> {
    let path = config_path(global);
    if global.config.is_none() && !path.exists() {
        init_logging(global, LogLevel::default());
        return Ok(None);
    }
    load(global).map(Some)
}

/// The filter level chosen by the flags, falling back to the config.
pub fn log_level(global: &GlobalArgs, configured: LogLevel) -> &'static str {
    if global.quiet {
        "error"
    } else if global.verbose {
        "debug"
    } else {
        configured.as_str()
    }
}

/// Installs the stderr log subscriber. `VESTA_LOG` overrides the level.
pub fn init_logging(global: &GlobalArgs, configured: LogLevel) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(log_level(global, configured)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// The toolchain backend described by `[compiler]`.
pub fn backend(config: &VestaConfig) -> Arc<SystemCompiler> {
    Arc::new(
        SystemCompiler::new(&config.compiler.program, &config.compiler.output_dir)
            .with_extra_args(config.compiler.extra_args.iter().cloned()),
    )
}

/// Workflow options from `[peer]`.
pub fn peer_options(peer: &PeerConfig) -> PeerOptions {
    PeerOptions {
        transfer_bind: peer.transfer_bind.clone(),
        transfer_advertise: peer.transfer_advertise.clone(),
        transfers: peer.transfers,
        serve_timeout: peer.serve_timeout(),
        wait: match peer.wait {
            WaitMode::Listen => WaitStrategy::Listen,
            WaitMode::Poll => WaitStrategy::Poll {
                interval: peer.poll_interval(),
            },
        },
        wait_timeout: peer.wait_timeout(),
        fetch_timeout: peer.fetch_timeout(),
        download_dir: peer.download_dir.clone(),
        elect: peer.elect,
    }
}

/// The node id from the flag, the config, or a fresh random one.
pub fn node_id(flag: Option<&str>, peer: Option<&PeerConfig>) -> String {
    flag.map(str::to_string)
        .or_else(|| peer.and_then(|p| p.node_id.clone()))
        .unwrap_or_else(|| format!("vesta-{}", uuid::Uuid::new_v4().simple()))
}

/// Directory membership after applying the flag overrides.
pub struct Membership {
    /// This node's identifier.
    pub node_id: String,
    /// Node to join, if any.
    pub join: Option<String>,
    /// Address to host on when not joining.
    pub listen: SocketAddr,
}

/// Merges `--join/--node-id/--listen` over `[peer]`.
pub fn membership(
    args: &PeerArgs,
    peer: &PeerConfig,
) -> Result<Membership, Box<dyn std::error::Error>> {
    let listen = args.listen.as_deref().unwrap_or(&peer.directory_listen);
    let listen: SocketAddr = listen
        .parse()
        .map_err(|e| format!("invalid directory listen address `{listen}`: {e}"))?;
    Ok(Membership {
        node_id: node_id(args.node_id.as_deref(), Some(peer)),
        join: args.join.clone().or_else(|| peer.join.clone()),
        listen,
    })
}

/// A runtime for the subcommands that drive one workflow directly.
pub fn runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

/// A token cancelled on Ctrl-C. Must be called within a runtime.
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping");
            interrupt.cancel();
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn global(quiet: bool, verbose: bool) -> GlobalArgs {
        GlobalArgs {
            quiet,
            verbose,
            config: None,
        }
    }

    #[test]
    fn flags_override_configured_level() {
        assert_eq!(log_level(&global(true, false), LogLevel::Debug), "error");
        assert_eq!(log_level(&global(false, true), LogLevel::Warn), "debug");
        assert_eq!(log_level(&global(false, false), LogLevel::Warn), "warn");
    }

    #[test]
    fn poll_mode_maps_to_strategy() {
        let peer = PeerConfig {
            wait: WaitMode::Poll,
            poll_interval_ms: 40,
            transfers: 3,
            ..PeerConfig::default()
        };
        let options = peer_options(&peer);
        assert_eq!(
            options.wait,
            WaitStrategy::Poll {
                interval: Duration::from_millis(40)
            }
        );
        assert_eq!(options.transfers, 3);
        assert!(options.elect);
    }

    #[test]
    fn node_id_prefers_flag() {
        let peer = PeerConfig {
            node_id: Some("from-config".to_string()),
            ..PeerConfig::default()
        };
        assert_eq!(node_id(Some("from-flag"), Some(&peer)), "from-flag");
        assert_eq!(node_id(None, Some(&peer)), "from-config");
        assert!(node_id(None, None).starts_with("vesta-"));
    }

    #[test]
    fn membership_applies_overrides() {
        let peer = PeerConfig {
            join: Some("10.0.0.5:7400".to_string()),
            ..PeerConfig::default()
        };
        let args = PeerArgs {
            listen: Some("127.0.0.1:9000".to_string()),
            ..PeerArgs::default()
        };
        let m = membership(&args, &peer).unwrap();
        assert_eq!(m.join.as_deref(), Some("10.0.0.5:7400"));
        assert_eq!(m.listen.port(), 9000);
    }

    #[test]
    fn invalid_listen_address_rejected() {
        let args = PeerArgs {
            listen: Some("not an address".to_string()),
            ..PeerArgs::default()
        };
        assert!(membership(&args, &PeerConfig::default()).is_err());
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(dir.path().join("absent.toml").display().to_string()),
        };
        assert!(load_optional(&global).is_err());
    }
}
