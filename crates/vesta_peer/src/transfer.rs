//! Bulk-transfer endpoint serving one binary to any number of peers.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::frame::{encode_frame, read_frame};

/// Why [`TransferServer::serve`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The requested number of transfers completed.
    Completed(usize),
    /// The shutdown token fired after this many transfers.
    Shutdown(usize),
    /// The serve window elapsed after this many transfers.
    TimedOut(usize),
}

impl ServeOutcome {
    /// Transfers completed before returning.
    pub fn transfers(&self) -> usize {
        match *self {
            ServeOutcome::Completed(n) | ServeOutcome::Shutdown(n) | ServeOutcome::TimedOut(n) => n,
        }
    }
}

/// A bound endpoint that sends a prepared frame to every connection.
pub struct TransferServer {
    listener: TcpListener,
    frame: Arc<Vec<u8>>,
    connect_addr: String,
}

impl TransferServer {
    /// Reads `binary` and binds the endpoint to `bind`.
    ///
    /// The connect address is the bound socket address, with the IP
    /// replaced by `advertise` when given.
    pub async fn bind(
        bind: &str,
        advertise: Option<&str>,
        binary: &Path,
    ) -> Result<Self, TransferError> {
        let payload = tokio::fs::read(binary)
            .await
            .map_err(|e| TransferError::Io {
                location: binary.display().to_string(),
                source: e,
            })?;
        let file_name = binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let frame = encode_frame(&file_name, &payload)?;

        let listener = TcpListener::bind(bind).await.map_err(|e| TransferError::Io {
            location: bind.to_string(),
            source: e,
        })?;
        let local: SocketAddr = listener.local_addr().map_err(|e| TransferError::Io {
            location: bind.to_string(),
            source: e,
        })?;
        let connect_addr = match advertise {
            Some(host) => format!("{host}:{}", local.port()),
            None => local.to_string(),
        };

        Ok(Self {
            listener,
            frame: Arc::new(frame),
            connect_addr,
        })
    }

    /// The address consumers connect to.
    pub fn connect_addr(&self) -> &str {
        &self.connect_addr
    }

    /// Serves until `transfers` sends complete, `shutdown` fires, or
    /// `window` elapses.
    pub async fn serve(
        self,
        transfers: usize,
        shutdown: CancellationToken,
        window: Duration,
    ) -> ServeOutcome {
        let mut sends: JoinSet<Result<SocketAddr, (SocketAddr, std::io::Error)>> = JoinSet::new();
        let mut completed = 0;
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            if completed >= transfers {
                return ServeOutcome::Completed(completed);
            }
            tokio::select! {
                _ = shutdown.cancelled() => return ServeOutcome::Shutdown(completed),
                _ = &mut deadline => return ServeOutcome::TimedOut(completed),
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let frame = self.frame.clone();
                        sends.spawn(send_frame(stream, peer, frame));
                    }
                    Err(e) => tracing::warn!(error = %e, "transfer accept failed"),
                },
                Some(joined) = sends.join_next() => match joined {
                    Ok(Ok(peer)) => {
                        completed += 1;
                        tracing::debug!(%peer, completed, "transfer complete");
                    }
                    Ok(Err((peer, e))) => tracing::warn!(%peer, error = %e, "transfer failed"),
                    Err(e) => tracing::warn!(error = %e, "transfer task failed"),
                },
            }
        }
    }
}

async fn send_frame(
    mut stream: TcpStream,
    peer: SocketAddr,
    frame: Arc<Vec<u8>>,
) -> Result<SocketAddr, (SocketAddr, std::io::Error)> {
    stream.write_all(&frame).await.map_err(|e| (peer, e))?;
    stream.shutdown().await.map_err(|e| (peer, e))?;
    Ok(peer)
}

/// Downloads the binary served at `location` into a uniquely named file
/// in `dest_dir`, returning its path.
///
/// Connecting and reading the whole frame must finish within `limit`.
pub async fn fetch(
    location: &str,
    dest_dir: &Path,
    stem: &str,
    limit: Duration,
) -> Result<PathBuf, TransferError> {
    let download = async {
        let mut stream = TcpStream::connect(location)
            .await
            .map_err(|e| TransferError::Io {
                location: location.to_string(),
                source: e,
            })?;
        read_frame(&mut stream, location).await
    };
    let (header, payload) = tokio::time::timeout(limit, download)
        .await
        .map_err(|_| TransferError::TimedOut {
            location: location.to_string(),
            after: limit,
        })??;

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| TransferError::Io {
            location: dest_dir.display().to_string(),
            source: e,
        })?;
    let path = dest_dir.join(format!(
        "{stem}_{}.{}",
        uuid::Uuid::new_v4().simple(),
        std::env::consts::DLL_EXTENSION
    ));
    tokio::fs::write(&path, &payload)
        .await
        .map_err(|e| TransferError::Io {
            location: path.display().to_string(),
            source: e,
        })?;

    tracing::debug!(
        %location,
        source_file = %header.file_name,
        path = %path.display(),
        bytes = payload.len(),
        "fetched binary"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: Duration = Duration::from_secs(5);

    async fn server_for(dir: &Path, payload: &[u8]) -> TransferServer {
        let binary = dir.join("vc_sort_0_256.so");
        std::fs::write(&binary, payload).unwrap();
        TransferServer::bind("127.0.0.1:0", None, &binary).await.unwrap()
    }

    #[tokio::test]
    async fn fetch_copies_binary() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_for(dir.path(), b"shared object bytes").await;
        let location = server.connect_addr().to_string();
        let serving = tokio::spawn(server.serve(1, CancellationToken::new(), Duration::from_secs(5)));

        let path = fetch(&location, &dir.path().join("dl"), "vc_sort_0_256", LIMIT)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"shared object bytes");
        assert_eq!(serving.await.unwrap(), ServeOutcome::Completed(1));
    }

    #[tokio::test]
    async fn fetched_files_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_for(dir.path(), b"bytes").await;
        let location = server.connect_addr().to_string();
        let serving = tokio::spawn(server.serve(2, CancellationToken::new(), Duration::from_secs(5)));

        let dl = dir.path().join("dl");
        let a = fetch(&location, &dl, "k", LIMIT).await.unwrap();
        let b = fetch(&location, &dl, "k", LIMIT).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(serving.await.unwrap().transfers(), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_serving() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_for(dir.path(), b"bytes").await;
        let token = CancellationToken::new();
        let serving = tokio::spawn(server.serve(1, token.clone(), Duration::from_secs(30)));
        token.cancel();
        assert_eq!(serving.await.unwrap(), ServeOutcome::Shutdown(0));
    }

    #[tokio::test]
    async fn window_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_for(dir.path(), b"bytes").await;
        let outcome = server
            .serve(1, CancellationToken::new(), Duration::from_millis(20))
            .await;
        assert_eq!(outcome, ServeOutcome::TimedOut(0));
    }

    #[tokio::test]
    async fn advertise_replaces_host() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("k.so");
        std::fs::write(&binary, b"x").unwrap();
        let server = TransferServer::bind("127.0.0.1:0", Some("peer-7.local"), &binary)
            .await
            .unwrap();
        assert!(server.connect_addr().starts_with("peer-7.local:"));
    }

    #[tokio::test]
    async fn missing_binary_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TransferServer::bind("127.0.0.1:0", None, &dir.path().join("absent.so")).await;
        assert!(matches!(result, Err(TransferError::Io { .. })));
    }

    #[tokio::test]
    async fn fetch_from_nothing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let err = fetch(&addr, dir.path(), "k", LIMIT).await.unwrap_err();
        assert!(matches!(err, TransferError::Io { .. }));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let holding = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let started = std::time::Instant::now();
        let err = fetch(&addr, dir.path(), "k", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
        holding.abort();
    }
}
