//! Client for a directory hosted by another node.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::error::DirectoryError;
use crate::protocol::{line_reader, read_message, write_message, Request, Response};
use crate::{Directory, ListenCallback, Subscription};

/// A directory handle that forwards every call to a hosting node.
pub struct RemoteDirectory {
    addr: String,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl RemoteDirectory {
    /// Creates a client for the host at `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// The host address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> Result<TcpStream, DirectoryError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DirectoryError::Shutdown);
        }
        TcpStream::connect(&self.addr)
            .await
            .map_err(|e| DirectoryError::Io {
                addr: self.addr.clone(),
                source: e,
            })
    }

    /// Sends one request and waits for the answer, to confirm the host is
    /// reachable and speaks the protocol.
    pub async fn check(&self) -> Result<(), DirectoryError> {
        match self.call(Request::Get { key: String::new() }).await? {
            Response::Values { .. } => Ok(()),
            other => Err(DirectoryError::Protocol {
                reason: format!("unexpected response to membership check: {other:?}"),
            }),
        }
    }

    async fn call(&self, request: Request) -> Result<Response, DirectoryError> {
        let (read, mut write) = self.connect().await?.into_split();
        write_message(&mut write, &request, &self.addr).await?;
        let mut lines = line_reader(read);
        match read_message::<Response>(&mut lines, &self.addr).await? {
            Some(Response::Error { reason }) => Err(DirectoryError::Rejected { reason }),
            Some(response) => Ok(response),
            None => Err(DirectoryError::Protocol {
                reason: "connection closed before response".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Directory for RemoteDirectory {
    async fn put(&self, key: &str, value: &str) -> Result<(), DirectoryError> {
        let request = Request::Put {
            key: key.to_string(),
            value: value.to_string(),
        };
        match self.call(request).await? {
            Response::Ok => Ok(()),
            other => Err(DirectoryError::Protocol {
                reason: format!("unexpected response to put: {other:?}"),
            }),
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<String>, DirectoryError> {
        match self.call(Request::Get { key: key.to_string() }).await? {
            Response::Values { values } => Ok(values),
            other => Err(DirectoryError::Protocol {
                reason: format!("unexpected response to get: {other:?}"),
            }),
        }
    }

    async fn listen(
        &self,
        key: &str,
        mut callback: ListenCallback,
    ) -> Result<Subscription, DirectoryError> {
        let (read, mut write) = self.connect().await?.into_split();
        write_message(&mut write, &Request::Listen { key: key.to_string() }, &self.addr).await?;

        let mut lines = line_reader(read);
        let addr = self.addr.clone();
        let key = key.to_string();
        let shutdown = self.shutdown.clone();
        let reader = tokio::spawn(async move {
            // Keep the write half alive so the host sees the subscription as open.
            let _write = write;
            loop {
                let next = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = read_message::<Response>(&mut lines, &addr) => next,
                };
                match next {
                    Ok(Some(Response::Values { values })) => {
                        if !callback(&values) {
                            break;
                        }
                    }
                    Ok(Some(other)) => {
                        tracing::warn!(%key, response = ?other, "unexpected listen notification");
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(%key, error = %e, "listen subscription failed");
                        break;
                    }
                }
            }
        });
        // Aborting drops the connection, which ends the host's registration.
        Ok(Subscription::new(move || reader.abort()))
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shutdown.cancel();
            tracing::debug!(addr = %self.addr, "remote directory client shut down");
        }
    }
}
