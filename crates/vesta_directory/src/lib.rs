//! Key/value directory used by peers to discover artifact locations.
//!
//! A [`Directory`] supports `put`, snapshot `get`, and push-style `listen`.
//! [`Table`] is the shared store; [`MemoryNode`] exposes it in-process and
//! [`DirectoryNode`] either hosts it over TCP or joins a node that does, so
//! several processes see one logical directory.

#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod node;
pub mod protocol;
pub mod remote;
pub mod server;
pub mod table;

use async_trait::async_trait;

pub use error::DirectoryError;
pub use memory::MemoryNode;
pub use node::DirectoryNode;
pub use remote::RemoteDirectory;
pub use server::DirectoryServer;
pub use table::Table;

/// Callback invoked with every value stored under a key.
///
/// Returning `true` keeps the subscription, `false` removes it. Callbacks
/// run while the directory holds its table lock and must not call back
/// into the directory.
pub type ListenCallback = Box<dyn FnMut(&[String]) -> bool + Send + 'static>;

/// A live `listen` registration.
///
/// Dropping the handle removes the callback, so a waiter that gives up
/// leaves nothing behind in the directory.
#[must_use = "dropping a subscription removes its callback"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
    /// Wraps the action that removes the registration.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// The directory capability consumed by producers and consumers.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Publishes `value` under `key`. Failures are not retried.
    async fn put(&self, key: &str, value: &str) -> Result<(), DirectoryError>;

    /// Reads every value under `key`. An empty list means nothing has been
    /// published yet.
    async fn get(&self, key: &str) -> Result<Vec<String>, DirectoryError>;

    /// Subscribes to publications under `key`.
    ///
    /// If values are already present the callback fires immediately with
    /// them, so a listener registered after a publication still sees it.
    /// The callback stays registered until it returns `false` or the
    /// returned [`Subscription`] is dropped.
    async fn listen(&self, key: &str, callback: ListenCallback)
        -> Result<Subscription, DirectoryError>;

    /// Stops the node. Safe to call more than once and before any put.
    async fn shutdown(&self);
}
