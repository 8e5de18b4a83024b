//! The producer workflow: build a variant, serve it, publish its endpoint.
//!
//! States run `Idle -> Building -> Serving -> Done | Failed`. The endpoint
//! is bound before the directory `put`, so a consumer that sees the
//! publication can always connect.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use vesta_common::{CompileOption, SpecKey};
use vesta_compiler::{Backend, BuildRequest, Linkable};
use vesta_directory::Directory;

use crate::error::{ProducerFailure, ProducerStage};
use crate::options::PeerOptions;
use crate::transfer::{ServeOutcome, TransferServer};

/// Producer workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// Not started.
    Idle,
    /// Compiling the variant.
    Building,
    /// Endpoint published and serving transfers.
    Serving,
    /// Served at least one transfer or was shut down while serving.
    Done,
    /// A step failed.
    Failed,
}

impl ProducerState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_enter(self, next: ProducerState) -> bool {
        use ProducerState::*;
        matches!(
            (self, next),
            (Idle, Building) | (Building, Serving) | (Building, Failed) | (Serving, Done) | (Serving, Failed)
        )
    }

    /// Whether the workflow has stopped.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProducerState::Done | ProducerState::Failed)
    }
}

/// Summary of a producer run that reached `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerReport {
    /// Final state, always [`ProducerState::Done`].
    pub state: ProducerState,
    /// Connect address that was published.
    pub location: String,
    /// Transfers completed before the endpoint closed.
    pub transfers: usize,
}

/// Builds, serves and publishes one variant per [`run`](Producer::run).
pub struct Producer<B: Backend> {
    backend: Arc<B>,
    directory: Arc<dyn Directory>,
    options: PeerOptions,
    state: Mutex<ProducerState>,
    location: Mutex<Option<String>>,
}

impl<B: Backend> Producer<B> {
    /// Creates an idle producer.
    pub fn new(backend: Arc<B>, directory: Arc<dyn Directory>, options: PeerOptions) -> Self {
        Self {
            backend,
            directory,
            options,
            state: Mutex::new(ProducerState::Idle),
            location: Mutex::new(None),
        }
    }

    /// The current state.
    pub fn state(&self) -> ProducerState {
        *self.state.lock()
    }

    /// The endpoint of the latest run, once bound.
    ///
    /// After a failed run this is still set if the endpoint may have been
    /// published.
    pub fn location(&self) -> Option<String> {
        self.location.lock().clone()
    }

    fn enter(&self, key: SpecKey, next: ProducerState) {
        let mut state = self.state.lock();
        debug_assert!(state.can_enter(next), "{:?} -> {next:?}", *state);
        tracing::debug!(%key, from = ?*state, to = ?next, "producer transition");
        *state = next;
    }

    fn fail(&self, key: SpecKey, stage: ProducerStage, reason: impl std::fmt::Display) -> ProducerFailure {
        let failure = ProducerFailure::new(stage, reason);
        tracing::warn!(%key, error = %failure, "producer failed");
        self.enter(key, ProducerState::Failed);
        failure
    }

    /// Runs the workflow for `key` under `function`'s directory key.
    ///
    /// `request` is built with `-fPIC` appended so the binary can be loaded
    /// by another process. Serving ends after the configured number of
    /// transfers, on `shutdown`, or when the serve window elapses; a window
    /// that elapses with no transfer at all is a serve failure.
    ///
    /// Each call starts over from [`ProducerState::Idle`].
    pub async fn run(
        &self,
        key: SpecKey,
        function: &str,
        request: &BuildRequest,
        shutdown: CancellationToken,
    ) -> Result<ProducerReport, ProducerFailure> {
        *self.state.lock() = ProducerState::Idle;
        *self.location.lock() = None;
        self.enter(key, ProducerState::Building);
        let request = request.clone().with_option(CompileOption::pic());
        let backend = self.backend.clone();
        let built = tokio::task::spawn_blocking(move || backend.build(&request)).await;
        let artifact = match built {
            Ok(Ok(artifact)) => artifact,
            Ok(Err(e)) => return Err(self.fail(key, ProducerStage::Build, e)),
            Err(e) => return Err(self.fail(key, ProducerStage::Build, e)),
        };

        let server = match TransferServer::bind(
            &self.options.transfer_bind,
            self.options.transfer_advertise.as_deref(),
            artifact.binary_path(),
        )
        .await
        {
            Ok(server) => server,
            Err(e) => return Err(self.fail(key, ProducerStage::Serve, e)),
        };
        let location = server.connect_addr().to_string();
        *self.location.lock() = Some(location.clone());

        let directory_key = key.directory_key(function);
        if let Err(e) = self.directory.put(&directory_key, &location).await {
            return Err(self.fail(key, ProducerStage::Publish, e));
        }
        self.enter(key, ProducerState::Serving);
        tracing::info!(%key, %location, "serving variant");

        let outcome = server
            .serve(self.options.transfers, shutdown, self.options.serve_timeout)
            .await;
        // The artifact owns the binary being served.
        drop(artifact);
        match outcome {
            ServeOutcome::TimedOut(0) => Err(self.fail(
                key,
                ProducerStage::Serve,
                format!("no transfer within {:?}", self.options.serve_timeout),
            )),
            outcome => {
                self.enter(key, ProducerState::Done);
                Ok(ProducerReport {
                    state: ProducerState::Done,
                    location,
                    transfers: outcome.transfers(),
                })
            }
        }
    }
}
