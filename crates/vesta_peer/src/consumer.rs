//! The consumer workflow: wait for a publication, fetch, load.
//!
//! States run `Idle -> Waiting -> Fetching -> Ready | Failed`. The wait is
//! always bounded by [`PeerOptions::wait_timeout`] and the whole run can be
//! abandoned through a cancellation token.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use vesta_common::SpecKey;
use vesta_compiler::Backend;
use vesta_directory::Directory;

use crate::error::ConsumerFailure;
use crate::options::{PeerOptions, WaitStrategy};
use crate::transfer::fetch;

/// Consumer workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Not started.
    Idle,
    /// Waiting for a publication under the directory key.
    Waiting,
    /// Downloading and loading the binary.
    Fetching,
    /// A loaded artifact was returned.
    Ready,
    /// A step failed or the run was cancelled.
    Failed,
}

impl ConsumerState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_enter(self, next: ConsumerState) -> bool {
        use ConsumerState::*;
        matches!(
            (self, next),
            (Idle, Waiting) | (Waiting, Fetching) | (Fetching, Ready) | (Idle, Failed) | (Waiting, Failed) | (Fetching, Failed)
        )
    }
}

/// Picks the location to fetch from among the published values.
///
/// More than one value means several producers published; the first in
/// arrival order is used and the rest are reported.
pub fn select_location<'a>(directory_key: &str, values: &'a [String]) -> Option<&'a str> {
    let first = values.first()?;
    if values.len() > 1 {
        tracing::warn!(
            key = %directory_key,
            count = values.len(),
            chosen = %first,
            ignored = ?&values[1..],
            "multiple producers published, using the first"
        );
    }
    Some(first.as_str())
}

fn fresh_locations(stale: &[String], values: &[String]) -> Vec<String> {
    values
        .iter()
        .filter(|v| !stale.contains(v))
        .cloned()
        .collect()
}

/// Discovers, downloads and loads one variant per [`run`](Consumer::run).
pub struct Consumer<B: Backend> {
    backend: Arc<B>,
    directory: Arc<dyn Directory>,
    options: PeerOptions,
    stale: Arc<[String]>,
    state: Mutex<ConsumerState>,
}

impl<B: Backend> Consumer<B> {
    /// Creates an idle consumer.
    pub fn new(backend: Arc<B>, directory: Arc<dyn Directory>, options: PeerOptions) -> Self {
        Self {
            backend,
            directory,
            options,
            stale: Arc::from(Vec::new()),
            state: Mutex::new(ConsumerState::Idle),
        }
    }

    /// Skips `locations` when they appear under the key.
    ///
    /// Publications are never withdrawn, so callers pass endpoints known to
    /// have stopped serving.
    pub fn ignoring(mut self, locations: Vec<String>) -> Self {
        self.stale = Arc::from(locations);
        self
    }

    /// The current state.
    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    fn enter(&self, key: SpecKey, next: ConsumerState) {
        let mut state = self.state.lock();
        debug_assert!(state.can_enter(next), "{:?} -> {next:?}", *state);
        tracing::debug!(%key, from = ?*state, to = ?next, "consumer transition");
        *state = next;
    }

    /// Runs the workflow for `key` under `function`'s directory key and
    /// returns an artifact exposing `symbols`.
    ///
    /// A failed run is not retried; the caller decides whether to run again.
    /// Each call starts over from [`ConsumerState::Idle`].
    pub async fn run(
        &self,
        key: SpecKey,
        function: &str,
        symbols: &[String],
        cancel: CancellationToken,
    ) -> Result<B::Artifact, ConsumerFailure> {
        *self.state.lock() = ConsumerState::Idle;
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ConsumerFailure::Aborted {
                reason: "cancelled".to_string(),
            }),
            result = self.drive(key, function, symbols) => result,
        };
        match result {
            Ok(artifact) => {
                self.enter(key, ConsumerState::Ready);
                Ok(artifact)
            }
            Err(failure) => {
                tracing::warn!(%key, error = %failure, "consumer failed");
                self.enter(key, ConsumerState::Failed);
                Err(failure)
            }
        }
    }

    async fn drive(
        &self,
        key: SpecKey,
        function: &str,
        symbols: &[String],
    ) -> Result<B::Artifact, ConsumerFailure> {
        let directory_key = key.directory_key(function);
        self.enter(key, ConsumerState::Waiting);

        let values = match tokio::time::timeout(self.options.wait_timeout, self.wait(&directory_key)).await {
            Ok(values) => values?,
            Err(_) => {
                return Err(ConsumerFailure::Timeout {
                    key: directory_key,
                    waited: self.options.wait_timeout,
                })
            }
        };
        let location = select_location(&directory_key, &values)
            .ok_or_else(|| ConsumerFailure::Aborted {
                reason: format!("empty publication for `{directory_key}`"),
            })?
            .to_string();

        self.enter(key, ConsumerState::Fetching);
        let path = fetch(
            &location,
            &self.options.download_dir,
            &directory_key,
            self.options.fetch_timeout,
        )
        .await
        .map_err(|source| ConsumerFailure::Transfer {
            location: location.clone(),
            source,
        })?;

        let backend = self.backend.clone();
        let symbols = symbols.to_vec();
        let load_path = path.clone();
        let loaded = tokio::task::spawn_blocking(move || backend.load(&load_path, &symbols))
            .await
            .map_err(|e| ConsumerFailure::Aborted {
                reason: format!("load task failed: {e}"),
            })?;
        let artifact = loaded.map_err(|source| ConsumerFailure::Load { path, source })?;
        tracing::info!(%key, %location, "fetched variant from peer");
        Ok(artifact)
    }

    async fn wait(&self, directory_key: &str) -> Result<Vec<String>, ConsumerFailure> {
        let lookup = |source| ConsumerFailure::Lookup {
            key: directory_key.to_string(),
            source,
        };
        match self.options.wait {
            WaitStrategy::Listen => {
                let (tx, rx) = oneshot::channel();
                let mut tx = Some(tx);
                let stale = self.stale.clone();
                // Held until the wait ends, including by timeout or cancel.
                let _subscription = self
                    .directory
                    .listen(
                        directory_key,
                        Box::new(move |values: &[String]| {
                            let fresh = fresh_locations(&stale, values);
                            if fresh.is_empty() {
                                return true;
                            }
                            if let Some(tx) = tx.take() {
                                let _ = tx.send(fresh);
                            }
                            false
                        }),
                    )
                    .await
                    .map_err(lookup)?;
                rx.await.map_err(|_| ConsumerFailure::Aborted {
                    reason: format!("subscription to `{directory_key}` closed"),
                })
            }
            WaitStrategy::Poll { interval } => loop {
                let values = self.directory.get(directory_key).await.map_err(lookup)?;
                let values = fresh_locations(&self.stale, &values);
                if !values.is_empty() {
                    return Ok(values);
                }
                tokio::time::sleep(interval).await;
            },
        }
    }
}
