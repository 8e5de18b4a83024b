//! Error types for compilation backends.

use std::path::PathBuf;

/// Why a build, load, or relink did not produce a usable artifact.
///
/// Backends return this as a value; it never escapes as a panic. The
/// cache never stores an entry for a request that failed this way.
#[derive(Debug, thiserror::Error)]
pub enum BuildFailure {
    /// A source file named in the request does not exist.
    #[error("missing source file {path}")]
    MissingSource {
        /// The path that could not be found.
        path: PathBuf,
    },

    /// The toolchain program could not be started.
    #[error("failed to invoke `{program}`: {source}")]
    Toolchain {
        /// The program that was invoked.
        program: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The toolchain ran but reported an error.
    #[error("`{program}` exited with {status}: {stderr}")]
    CompilerExit {
        /// The program that was invoked.
        program: String,
        /// Exit status description.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The binary was produced but a requested entry symbol is absent.
    #[error("symbol `{symbol}` not found in {path}")]
    UnresolvedSymbol {
        /// The missing symbol name.
        symbol: String,
        /// The binary that was searched.
        path: PathBuf,
    },

    /// The binary could not be loaded into the process.
    #[error("failed to load {path}: {reason}")]
    Load {
        /// The binary path.
        path: PathBuf,
        /// Loader error message.
        reason: String,
    },

    /// An I/O error while preparing inputs or outputs.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
