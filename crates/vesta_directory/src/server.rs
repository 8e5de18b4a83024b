//! TCP front end that lets remote nodes use a hosted table.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::DirectoryError;
use crate::protocol::{line_reader, read_message, write_message, LineReader, Request, Response};
use crate::table::Table;

/// Accepts directory connections and applies them to a [`Table`].
pub struct DirectoryServer {
    listener: TcpListener,
    table: Arc<Table>,
    local_addr: SocketAddr,
}

impl DirectoryServer {
    /// Binds to `addr`; port 0 picks an ephemeral port.
    pub async fn bind(addr: SocketAddr, table: Arc<Table>) -> Result<Self, DirectoryError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DirectoryError::Io {
                addr: addr.to_string(),
                source: e,
            })?;
        let local_addr = listener.local_addr().map_err(|e| DirectoryError::Io {
            addr: addr.to_string(),
            source: e,
        })?;
        Ok(Self {
            listener,
            table,
            local_addr,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(addr = %self.local_addr, "directory server listening");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let table = self.table.clone();
                        let token = shutdown.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, table, token).await {
                                tracing::debug!(%peer, error = %e, "directory connection ended with error");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "directory accept failed"),
                },
            }
        }
        tracing::info!(addr = %self.local_addr, "directory server stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    table: Arc<Table>,
    shutdown: CancellationToken,
) -> Result<(), DirectoryError> {
    let peer_name = peer.to_string();
    let (read, mut write) = stream.into_split();
    let mut lines = line_reader(read);

    let Some(request) = read_message::<Request>(&mut lines, &peer_name).await? else {
        return Ok(());
    };

    match request {
        Request::Put { key, value } => {
            table.put(&key, &value);
            write_message(&mut write, &Response::Ok, &peer_name).await
        }
        Request::Get { key } => {
            let values = table.get(&key);
            write_message(&mut write, &Response::Values { values }, &peer_name).await
        }
        Request::Listen { key } => {
            let (tx, rx) = mpsc::unbounded_channel::<Vec<String>>();
            let id = table.listen(&key, Box::new(move |values: &[String]| tx.send(values.to_vec()).is_ok()));
            let streamed = stream_values(rx, &mut lines, &mut write, &peer_name, &shutdown).await;
            table.unlisten(&key, id);
            streamed
        }
    }
}

async fn stream_values(
    mut rx: mpsc::UnboundedReceiver<Vec<String>>,
    lines: &mut LineReader,
    write: &mut OwnedWriteHalf,
    peer_name: &str,
    shutdown: &CancellationToken,
) -> Result<(), DirectoryError> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            next = rx.recv() => match next {
                Some(values) => {
                    write_message(write, &Response::Values { values }, peer_name).await?;
                }
                None => return Ok(()),
            },
            // The client closes its side once it has what it needs.
            closed = lines.next_line() => {
                if !matches!(closed, Ok(Some(_))) {
                    return Ok(());
                }
            }
        }
    }
}
