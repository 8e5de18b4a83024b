//! Tunables for the producer and consumer workflows.

use std::path::PathBuf;
use std::time::Duration;

/// How a consumer waits for a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Subscribe with `listen` and wake on the first publication.
    Listen,
    /// Re-read with `get` every `interval` until a value appears.
    Poll {
        /// Delay between reads.
        interval: Duration,
    },
}

/// Settings shared by [`Producer`](crate::Producer), [`Consumer`](crate::Consumer)
/// and [`DistributedCache`](crate::DistributedCache).
#[derive(Debug, Clone)]
pub struct PeerOptions {
    /// Address the transfer endpoint binds; port 0 picks an ephemeral port.
    pub transfer_bind: String,
    /// Host published to consumers instead of the bound IP, for wildcard binds.
    pub transfer_advertise: Option<String>,
    /// Completed transfers after which the producer stops serving.
    ///
    /// [`DistributedCache`](crate::DistributedCache) serves one more, for
    /// the node's own consumer.
    pub transfers: usize,
    /// Longest the producer serves before giving up.
    pub serve_timeout: Duration,
    /// Consumer wait strategy.
    pub wait: WaitStrategy,
    /// Longest the consumer waits for a publication.
    pub wait_timeout: Duration,
    /// Longest a download may take, from connect to the last byte.
    pub fetch_timeout: Duration,
    /// Directory receiving downloaded binaries.
    pub download_dir: PathBuf,
    /// Elect a single producer per key through the directory.
    pub elect: bool,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self {
            transfer_bind: "127.0.0.1:0".to_string(),
            transfer_advertise: None,
            transfers: 1,
            serve_timeout: Duration::from_secs(60),
            wait: WaitStrategy::Listen,
            wait_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(30),
            download_dir: std::env::temp_dir().join("vesta-downloads"),
            elect: true,
        }
    }
}
