//! Peer artifact exchange and the distributed specialization cache.
//!
//! A [`Producer`] builds a variant, serves its binary over a
//! [`TransferServer`], and publishes the endpoint under the key's directory
//! entry. A [`Consumer`] waits for that entry, fetches the binary, and loads
//! it. [`DistributedCache`] runs both concurrently on a miss and caches only
//! a successful consumer result.

#![warn(missing_docs)]

pub mod consumer;
pub mod distributed;
pub mod election;
pub mod error;
pub mod frame;
pub mod node;
pub mod options;
pub mod producer;
pub mod transfer;

pub use consumer::{Consumer, ConsumerState};
pub use distributed::DistributedCache;
pub use election::{elect, Election, Role};
pub use error::{ConsumerFailure, PeerError, ProducerFailure, ProducerStage, TransferError};
pub use node::PeerNode;
pub use options::{PeerOptions, WaitStrategy};
pub use producer::{Producer, ProducerReport, ProducerState};
pub use transfer::{fetch, ServeOutcome, TransferServer};
