//! Directory node lifecycle: bootstrap, join, shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::DirectoryError;
use crate::memory::MemoryNode;
use crate::remote::RemoteDirectory;
use crate::server::DirectoryServer;
use crate::table::Table;
use crate::{Directory, ListenCallback, Subscription};

enum Backing {
    Host(MemoryNode),
    Joined(RemoteDirectory),
}

/// A process-wide directory node.
///
/// Without a join address the node hosts the table and serves it on the
/// listen address; with one, it forwards every call to that host, so all
/// nodes bootstrapped against the same host form one logical directory.
/// The node must outlive every workflow using it and be shut down after
/// they finish.
pub struct DirectoryNode {
    id: String,
    address: String,
    backing: Backing,
    shutdown: CancellationToken,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl DirectoryNode {
    /// Starts a node.
    ///
    /// `listen` is only used when hosting; port 0 picks an ephemeral port.
    /// Joining fails if the host does not answer one request.
    /// Must be called from within a Tokio runtime.
    pub async fn bootstrap(
        id: &str,
        join: Option<&str>,
        listen: SocketAddr,
    ) -> Result<Self, DirectoryError> {
        let shutdown = CancellationToken::new();
        match join {
            Some(host) => {
                let remote = RemoteDirectory::new(host);
                remote.check().await?;
                tracing::info!(node = id, host, "joined directory");
                Ok(Self {
                    id: id.to_string(),
                    address: host.to_string(),
                    backing: Backing::Joined(remote),
                    shutdown,
                    server: Mutex::new(None),
                })
            }
            None => {
                let table = Arc::new(Table::new());
                let server = DirectoryServer::bind(listen, table.clone()).await?;
                let address = server.local_addr().to_string();
                let handle = tokio::spawn(server.run(shutdown.clone()));
                tracing::info!(node = id, %address, "hosting directory");
                Ok(Self {
                    id: id.to_string(),
                    address,
                    backing: Backing::Host(MemoryNode::with_table(id, table)),
                    shutdown,
                    server: Mutex::new(Some(handle)),
                })
            }
        }
    }

    /// This node's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The address other nodes join: this node's own when hosting, the
    /// host's when joined.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether this node hosts the table.
    pub fn is_host(&self) -> bool {
        matches!(self.backing, Backing::Host(_))
    }

    /// Waits for the hosting server task to finish after shutdown.
    ///
    /// Returns immediately for joined nodes or if already joined.
    pub async fn join(&self) {
        let handle = self.server.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(node = %self.id, error = %e, "directory server task failed");
            }
        }
    }

    fn inner(&self) -> &dyn Directory {
        match &self.backing {
            Backing::Host(node) => node as &dyn Directory,
            Backing::Joined(remote) => remote as &dyn Directory,
        }
    }
}

#[async_trait]
impl Directory for DirectoryNode {
    async fn put(&self, key: &str, value: &str) -> Result<(), DirectoryError> {
        self.inner().put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Vec<String>, DirectoryError> {
        self.inner().get(key).await
    }

    async fn listen(
        &self,
        key: &str,
        callback: ListenCallback,
    ) -> Result<Subscription, DirectoryError> {
        self.inner().listen(key, callback).await
    }

    async fn shutdown(&self) {
        self.shutdown.cancel();
        self.inner().shutdown().await;
        if let Backing::Host(node) = &self.backing {
            node.table().clear_listeners();
        }
    }
}
