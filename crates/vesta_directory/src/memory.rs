//! In-process directory nodes sharing one table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DirectoryError;
use crate::table::Table;
use crate::{Directory, ListenCallback, Subscription};

/// A directory node whose table lives in this process.
///
/// Nodes created with [`MemoryNode::join`] share the table of the node they
/// join, forming one logical directory. Shutting a node down only affects
/// that node's handle.
pub struct MemoryNode {
    id: String,
    table: Arc<Table>,
    closed: AtomicBool,
}

impl MemoryNode {
    /// Starts a node with a fresh table.
    pub fn bootstrap(id: impl Into<String>) -> Self {
        Self::with_table(id, Arc::new(Table::new()))
    }

    /// Starts a node that shares `other`'s table.
    pub fn join(id: impl Into<String>, other: &MemoryNode) -> Self {
        Self::with_table(id, other.table.clone())
    }

    /// Starts a node over an existing table.
    pub fn with_table(id: impl Into<String>, table: Arc<Table>) -> Self {
        Self {
            id: id.into(),
            table,
            closed: AtomicBool::new(false),
        }
    }

    /// This node's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The shared table.
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    fn check_open(&self) -> Result<(), DirectoryError> {
        if self.closed.load(Ordering::Acquire) {
            Err(DirectoryError::Shutdown)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Directory for MemoryNode {
    async fn put(&self, key: &str, value: &str) -> Result<(), DirectoryError> {
        self.check_open()?;
        tracing::debug!(node = %self.id, key, value, "put");
        self.table.put(key, value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<String>, DirectoryError> {
        self.check_open()?;
        Ok(self.table.get(key))
    }

    async fn listen(
        &self,
        key: &str,
        callback: ListenCallback,
    ) -> Result<Subscription, DirectoryError> {
        self.check_open()?;
        Ok(self.table.subscribe(key, callback))
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(node = %self.id, "memory node shut down");
        }
    }
}
