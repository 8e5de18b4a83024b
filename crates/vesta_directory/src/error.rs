//! Error types for directory operations.

/// Errors returned by [`Directory`](crate::Directory) implementations.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The node has been shut down.
    #[error("directory node is shut down")]
    Shutdown,

    /// A network error while talking to a directory node.
    #[error("directory I/O error with {addr}: {source}")]
    Io {
        /// The remote or local address involved.
        addr: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A peer sent a message that could not be understood.
    #[error("directory protocol error: {reason}")]
    Protocol {
        /// Description of the problem.
        reason: String,
    },

    /// The hosting node refused the request.
    #[error("directory request rejected: {reason}")]
    Rejected {
        /// The reason given by the host.
        reason: String,
    },
}
