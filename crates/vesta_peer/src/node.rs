//! The process-wide peer node: async runtime plus directory membership.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use vesta_directory::{Directory, DirectoryNode};

use crate::error::PeerError;

/// A long-lived node shared by every distributed cache in the process.
///
/// The node owns the runtime the producer and consumer workflows run on.
/// Producers keep serving in the background after a resolve returns.
/// [`shutdown`](PeerNode::shutdown) waits for in-flight resolves, then stops
/// and awaits the background producers, and only then stops the directory,
/// so workflows never outlive the node they use.
pub struct PeerNode {
    id: String,
    runtime: Runtime,
    directory: Arc<dyn Directory>,
    host: Option<Arc<DirectoryNode>>,
    inflight: RwLock<()>,
    closed: AtomicBool,
    background: CancellationToken,
    tasks: TaskTracker,
}

fn runtime() -> Result<Runtime, PeerError> {
    Builder::new_multi_thread()
        .enable_all()
        .thread_name("vesta-peer")
        .build()
        .map_err(PeerError::Runtime)
}

impl PeerNode {
    /// Starts a node that hosts a TCP directory on `listen`, or joins the
    /// one at `join`.
    ///
    /// Must not be called from within an async runtime.
    pub fn bootstrap(id: &str, join: Option<&str>, listen: SocketAddr) -> Result<Self, PeerError> {
        let runtime = runtime()?;
        let node = Arc::new(runtime.block_on(DirectoryNode::bootstrap(id, join, listen))?);
        Ok(Self {
            id: id.to_string(),
            runtime,
            directory: node.clone(),
            host: Some(node),
            inflight: RwLock::new(()),
            closed: AtomicBool::new(false),
            background: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// Starts a node over an existing directory, such as a
    /// [`MemoryNode`](vesta_directory::MemoryNode) shared between caches.
    pub fn with_directory(id: &str, directory: Arc<dyn Directory>) -> Result<Self, PeerError> {
        Ok(Self {
            id: id.to_string(),
            runtime: runtime()?,
            directory,
            host: None,
            inflight: RwLock::new(()),
            closed: AtomicBool::new(false),
            background: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// This node's identifier, used in producer election.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The directory the workflows publish to and read from.
    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// The TCP directory address, when bootstrapped over TCP.
    pub fn address(&self) -> Option<&str> {
        self.host.as_ref().map(|node| node.address())
    }

    /// Whether [`shutdown`](PeerNode::shutdown) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the start of a workflow; shutdown waits until the guard drops.
    pub(crate) fn begin(&self) -> Result<RwLockReadGuard<'_, ()>, PeerError> {
        let guard = self.inflight.read();
        if self.is_closed() {
            return Err(PeerError::Shutdown);
        }
        Ok(guard)
    }

    /// A token cancelled when the node shuts down.
    pub(crate) fn background_token(&self) -> CancellationToken {
        self.background.child_token()
    }

    /// Spawns a task that shutdown waits for. Must be called on the node's
    /// runtime.
    pub(crate) fn spawn_background<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tasks.spawn(future)
    }

    /// Number of background tasks still running.
    pub fn background_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Drives `future` to completion on the node's runtime.
    ///
    /// Must not be called from within an async runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Waits for in-flight resolves, stops background producers, then stops
    /// the directory node.
    ///
    /// Safe to call more than once. Must not be called from inside a
    /// resolve on the same node.
    pub fn shutdown(&self) {
        let _exclusive = self.inflight.write();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.background.cancel();
        self.tasks.close();
        self.runtime.block_on(async {
            self.tasks.wait().await;
            self.directory.shutdown().await;
            if let Some(node) = &self.host {
                node.join().await;
            }
        });
        tracing::info!(node = %self.id, "peer node shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesta_directory::MemoryNode;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn tcp_bootstrap_and_join_share_directory() {
        let host = PeerNode::bootstrap("a", None, loopback()).unwrap();
        let address = host.address().unwrap().to_string();
        let peer = PeerNode::bootstrap("b", Some(&address), loopback()).unwrap();

        host.block_on(host.directory().put("k", "v")).unwrap();
        let values = peer.block_on(peer.directory().get("k")).unwrap();
        assert_eq!(values, vec!["v"]);

        peer.shutdown();
        host.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let node = PeerNode::with_directory("a", Arc::new(MemoryNode::bootstrap("a"))).unwrap();
        node.shutdown();
        node.shutdown();
        assert!(node.is_closed());
    }

    #[test]
    fn shutdown_stops_background_tasks() {
        let node = PeerNode::with_directory("a", Arc::new(MemoryNode::bootstrap("a"))).unwrap();
        let stop = node.background_token();
        let task = node.block_on(async {
            node.spawn_background(async move {
                stop.cancelled().await;
                7
            })
        });
        assert_eq!(node.background_tasks(), 1);
        node.shutdown();
        assert_eq!(node.background_tasks(), 0);
        assert_eq!(node.block_on(task).unwrap(), 7);
    }

    #[test]
    fn begin_after_shutdown_fails() {
        let node = PeerNode::with_directory("a", Arc::new(MemoryNode::bootstrap("a"))).unwrap();
        assert!(node.begin().is_ok());
        node.shutdown();
        assert!(matches!(node.begin(), Err(PeerError::Shutdown)));
    }
}
