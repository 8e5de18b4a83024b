//! Error types for the peer exchange protocol.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use vesta_common::SpecKey;
use vesta_compiler::BuildFailure;
use vesta_directory::DirectoryError;

/// Errors from the bulk-transfer endpoint and its frame codec.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// A network or file I/O error.
    #[error("transfer I/O error at {location}: {source}")]
    Io {
        /// Address or path involved.
        location: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The download did not finish in time.
    #[error("transfer from {location} did not finish within {after:?}")]
    TimedOut {
        /// Address being fetched from.
        location: String,
        /// The limit that elapsed.
        after: Duration,
    },

    /// The frame header is missing, truncated, or has the wrong magic.
    #[error("invalid transfer header: {reason}")]
    InvalidHeader {
        /// Description of the header problem.
        reason: String,
    },

    /// The sender speaks a different frame format version.
    #[error("transfer format mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The expected format version.
        expected: u32,
        /// The version found in the header.
        actual: u32,
    },

    /// The payload does not match the header checksum.
    #[error("transfer checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Checksum from the header.
        expected: String,
        /// Checksum of the received payload.
        actual: String,
    },

    /// The advertised payload exceeds the accepted size.
    #[error("transfer payload of {len} bytes exceeds limit of {limit}")]
    TooLarge {
        /// Advertised length.
        len: u64,
        /// Accepted maximum.
        limit: u64,
    },
}

/// The producer step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerStage {
    /// Compiling the variant.
    Build,
    /// Publishing the endpoint in the directory.
    Publish,
    /// Binding or running the transfer endpoint.
    Serve,
}

impl fmt::Display for ProducerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProducerStage::Build => "build",
            ProducerStage::Publish => "publish",
            ProducerStage::Serve => "serve",
        })
    }
}

/// Why a producer ended in `Failed`.
#[derive(Debug, thiserror::Error)]
#[error("producer {stage} step failed: {reason}")]
pub struct ProducerFailure {
    /// Which step failed.
    pub stage: ProducerStage,
    /// What went wrong.
    pub reason: String,
}

impl ProducerFailure {
    /// Creates a failure for `stage`.
    pub fn new(stage: ProducerStage, reason: impl fmt::Display) -> Self {
        Self {
            stage,
            reason: reason.to_string(),
        }
    }
}

/// Why a consumer ended in `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerFailure {
    /// No publication arrived within the wait bound.
    #[error("no publication for `{key}` within {waited:?}")]
    Timeout {
        /// Directory key waited on.
        key: String,
        /// How long the consumer waited.
        waited: Duration,
    },

    /// The directory could not be read or subscribed to.
    #[error("directory lookup for `{key}` failed: {source}")]
    Lookup {
        /// Directory key.
        key: String,
        /// The directory's error.
        source: DirectoryError,
    },

    /// Downloading the binary failed.
    #[error("fetching from {location} failed: {source}")]
    Transfer {
        /// Location published by the producer.
        location: String,
        /// The transfer error.
        source: TransferError,
    },

    /// The downloaded binary could not be loaded or lacks a symbol.
    #[error("loading {path} failed: {source}")]
    Load {
        /// Local copy of the binary.
        path: PathBuf,
        /// The backend's reason.
        source: BuildFailure,
    },

    /// The wait was abandoned before completing.
    #[error("consumer aborted: {reason}")]
    Aborted {
        /// Why the wait stopped.
        reason: String,
    },
}

/// Errors returned by [`DistributedCache::resolve`](crate::DistributedCache::resolve)
/// and the peer node.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// This node's producer failed, so no artifact could be fetched.
    #[error("variant {key}: {source}")]
    Producer {
        /// The key being resolved.
        key: SpecKey,
        /// The producer's failure.
        source: ProducerFailure,
    },

    /// The consumer did not reach `Ready`.
    #[error("variant {key}: {source}")]
    Consumer {
        /// The key being resolved.
        key: SpecKey,
        /// The consumer's failure.
        source: ConsumerFailure,
    },

    /// Producer election through the directory failed.
    #[error("variant {key}: producer election failed: {source}")]
    Election {
        /// The key being resolved.
        key: SpecKey,
        /// The directory's error.
        source: DirectoryError,
    },

    /// The directory node could not be started.
    #[error("failed to start peer node: {0}")]
    Bootstrap(#[from] DirectoryError),

    /// The async runtime could not be created.
    #[error("failed to start peer runtime: {0}")]
    Runtime(std::io::Error),

    /// The peer node was shut down.
    #[error("peer node is shut down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_failure_names_stage() {
        let err = ProducerFailure::new(ProducerStage::Publish, "connection refused");
        assert_eq!(
            err.to_string(),
            "producer publish step failed: connection refused"
        );
    }

    #[test]
    fn timeout_display() {
        let err = ConsumerFailure::Timeout {
            key: "vc_sort_0_256".to_string(),
            waited: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "no publication for `vc_sort_0_256` within 1.5s"
        );
    }

    #[test]
    fn peer_error_names_key() {
        let err = PeerError::Consumer {
            key: SpecKey::new(0, 256).unwrap(),
            source: ConsumerFailure::Aborted {
                reason: "producer failed".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("[0, 256)"));
        assert!(msg.contains("producer failed"));
    }

    #[test]
    fn checksum_mismatch_display() {
        let err = TransferError::ChecksumMismatch {
            expected: "aabb".to_string(),
            actual: "ccdd".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aabb"));
        assert!(msg.contains("ccdd"));
    }
}
