//! Vesta CLI: build, exchange and serve specialized kernel variants.
//!
//! Provides `vesta build` for local builds through the registry,
//! `vesta resolve` for the full peer exchange, `vesta serve` and
//! `vesta fetch` for running one side of the exchange, and
//! `vesta directory` for hosting a directory node.

#![warn(missing_docs)]

mod build;
mod directory;
mod fetch;
mod resolve;
mod serve;
mod setup;

use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use vesta_common::{InvalidKey, SpecKey};

/// Vesta: a specialization cache for range-parameterized kernels.
#[derive(Parser, Debug)]
#[command(name = "vesta", version, about = "Vesta specialization cache")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a `vesta.toml` file or the directory holding one.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a variant locally through the registry.
    Build(BuildArgs),
    /// Resolve a variant through the peer exchange.
    Resolve(ResolveArgs),
    /// Build a variant and serve it to peers.
    Serve(ServeArgs),
    /// Wait for a peer's publication and fetch the variant.
    Fetch(FetchArgs),
    /// Host a directory node until interrupted.
    Directory(DirectoryArgs),
}

/// The specialization range `[min, max)`.
#[derive(Args, Debug, Clone, Copy)]
pub struct KeyArgs {
    /// Inclusive lower bound.
    #[arg(long, allow_negative_numbers = true)]
    pub min: i64,

    /// Exclusive upper bound.
    #[arg(long, allow_negative_numbers = true)]
    pub max: i64,
}

impl KeyArgs {
    /// The validated key.
    pub fn key(&self) -> Result<SpecKey, InvalidKey> {
        SpecKey::new(self.min, self.max)
    }
}

/// Directory membership overrides shared by the peer commands.
#[derive(Args, Debug, Clone, Default)]
pub struct PeerArgs {
    /// Directory node to join instead of `[peer].join`.
    #[arg(long)]
    pub join: Option<String>,

    /// Node identifier instead of `[peer].node_id`.
    #[arg(long)]
    pub node_id: Option<String>,

    /// Address to host the directory on instead of `[peer].directory_listen`.
    #[arg(long)]
    pub listen: Option<String>,
}

/// Arguments for the `vesta build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// The range to build.
    #[command(flatten)]
    pub key: KeyArgs,

    /// Output format for the result.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `vesta resolve` subcommand.
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// The range to resolve.
    #[command(flatten)]
    pub key: KeyArgs,

    /// Directory membership.
    #[command(flatten)]
    pub peer: PeerArgs,

    /// Output format for the result.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `vesta serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// The range to build and serve.
    #[command(flatten)]
    pub key: KeyArgs,

    /// Directory membership.
    #[command(flatten)]
    pub peer: PeerArgs,

    /// Transfers to serve before exiting instead of `[peer].transfers`.
    #[arg(long)]
    pub transfers: Option<usize>,
}

/// Arguments for the `vesta fetch` subcommand.
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// The range to fetch.
    #[command(flatten)]
    pub key: KeyArgs,

    /// Directory membership.
    #[command(flatten)]
    pub peer: PeerArgs,

    /// Seconds to wait for a publication instead of `[peer].wait_timeout_secs`.
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Arguments for the `vesta directory` subcommand.
#[derive(Parser, Debug)]
pub struct DirectoryArgs {
    /// Address to listen on instead of `[peer].directory_listen`.
    #[arg(long)]
    pub listen: Option<String>,

    /// Node identifier instead of `[peer].node_id`.
    #[arg(long)]
    pub node_id: Option<String>,
}

/// Result output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Resolve(ref args) => resolve::run(args, &global),
        Command::Serve(ref args) => serve::run(args, &global),
        Command::Fetch(ref args) => fetch::run(args, &global),
        Command::Directory(ref args) => directory::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_build_default() {
        let cli = Cli::parse_from(["vesta", "build", "--min", "0", "--max", "256"]);
        match cli.command {
            Command::Build(ref args) => {
                assert_eq!(args.key.min, 0);
                assert_eq!(args.key.max, 256);
                assert_eq!(args.format, ReportFormat::Text);
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn parse_negative_bounds() {
        let cli = Cli::parse_from(["vesta", "build", "--min", "-64", "--max", "-8"]);
        match cli.command {
            Command::Build(ref args) => {
                assert_eq!(args.key.key().unwrap(), SpecKey::new(-64, -8).unwrap());
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn inverted_range_rejected_by_key() {
        let cli = Cli::parse_from(["vesta", "build", "--min", "9", "--max", "3"]);
        match cli.command {
            Command::Build(ref args) => assert!(args.key.key().is_err()),
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn missing_bound_is_an_error() {
        assert!(Cli::try_parse_from(["vesta", "build", "--min", "0"]).is_err());
    }

    #[test]
    fn parse_resolve_with_peer_args() {
        let cli = Cli::parse_from([
            "vesta",
            "resolve",
            "--min",
            "0",
            "--max",
            "512",
            "--join",
            "10.0.0.5:7400",
            "--node-id",
            "worker-2",
            "--format",
            "json",
        ]);
        match cli.command {
            Command::Resolve(ref args) => {
                assert_eq!(args.peer.join.as_deref(), Some("10.0.0.5:7400"));
                assert_eq!(args.peer.node_id.as_deref(), Some("worker-2"));
                assert!(args.peer.listen.is_none());
                assert_eq!(args.format, ReportFormat::Json);
            }
            _ => panic!("expected Resolve command"),
        }
    }

    #[test]
    fn parse_serve_transfers() {
        let cli = Cli::parse_from([
            "vesta",
            "serve",
            "--min",
            "0",
            "--max",
            "256",
            "--transfers",
            "3",
        ]);
        match cli.command {
            Command::Serve(ref args) => assert_eq!(args.transfers, Some(3)),
            _ => panic!("expected Serve command"),
        }
    }

    #[test]
    fn parse_fetch_timeout() {
        let cli = Cli::parse_from([
            "vesta", "fetch", "--min", "0", "--max", "256", "--timeout", "5",
        ]);
        match cli.command {
            Command::Fetch(ref args) => assert_eq!(args.timeout, Some(5)),
            _ => panic!("expected Fetch command"),
        }
    }

    #[test]
    fn parse_directory() {
        let cli = Cli::parse_from(["vesta", "directory", "--listen", "0.0.0.0:7400"]);
        match cli.command {
            Command::Directory(ref args) => {
                assert_eq!(args.listen.as_deref(), Some("0.0.0.0:7400"));
            }
            _ => panic!("expected Directory command"),
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from([
            "vesta",
            "--quiet",
            "--config",
            "conf/vesta.toml",
            "directory",
        ]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("conf/vesta.toml"));
    }

    #[test]
    fn parse_verbose_after_subcommand() {
        let cli = Cli::parse_from(["vesta", "build", "--min", "0", "--max", "1", "-v"]);
        assert!(cli.verbose);
    }
}
