//! The distributed specialization cache.
//!
//! A miss runs the producer and consumer workflows concurrently on the
//! node's runtime and caches the consumer's artifact. Nothing is cached
//! when the consumer fails, so the next resolve runs the whole exchange
//! again. After a successful handoff the producer keeps serving other
//! nodes in the background until its transfers or serve window run out.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vesta_cache::KeyedSlots;
use vesta_common::SpecKey;
use vesta_compiler::{Backend, BuildRequest, Linkable};
use vesta_directory::Directory;

use crate::consumer::Consumer;
use crate::election::{close_location, closed_locations, elect, retire, Role};
use crate::error::{ConsumerFailure, PeerError, ProducerFailure};
use crate::node::PeerNode;
use crate::options::PeerOptions;
use crate::producer::{Producer, ProducerReport};

type ProducerTask = JoinHandle<Result<ProducerReport, ProducerFailure>>;

/// A producer still serving a variant this cache already fetched.
struct Serving {
    stop: CancellationToken,
    task: ProducerTask,
}

/// Specialization cache whose misses are filled through the peer exchange.
pub struct DistributedCache<B: Backend> {
    backend: Arc<B>,
    node: Arc<PeerNode>,
    function: String,
    options: PeerOptions,
    slots: KeyedSlots<B::Artifact>,
    serving: Mutex<HashMap<SpecKey, Serving>>,
}

impl<B: Backend> DistributedCache<B> {
    /// Creates an empty cache publishing variants of `function`.
    pub fn new(
        backend: Arc<B>,
        node: Arc<PeerNode>,
        function: impl Into<String>,
        options: PeerOptions,
    ) -> Self {
        Self {
            backend,
            node,
            function: function.into(),
            options,
            slots: KeyedSlots::new(),
            serving: Mutex::new(HashMap::new()),
        }
    }

    /// The node this cache runs on.
    pub fn node(&self) -> &Arc<PeerNode> {
        &self.node
    }

    /// The logical function name used in directory keys.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Returns a linked artifact for `key`, running the exchange on a miss.
    ///
    /// Blocks until the consumer finishes. Concurrent resolves of one key
    /// serialize, so at most one exchange per key runs in this process.
    /// Must not be called from within an async runtime.
    pub fn resolve(
        &self,
        key: SpecKey,
        request: &BuildRequest,
    ) -> Result<Arc<B::Artifact>, PeerError> {
        let _inflight = self.node.begin()?;
        let slot = self.slots.slot(key);
        let mut entry = slot.lock();

        if let Some(artifact) = entry.clone() {
            match artifact.link() {
                Ok(()) => return Ok(artifact),
                Err(e) => {
                    tracing::warn!(%key, error = %e, "re-link failed, fetching again");
                    artifact.fold();
                    *entry = None;
                }
            }
        }

        tracing::debug!(%key, function = %self.function, "distributed miss");
        let artifact = Arc::new(self.node.block_on(self.exchange(key, request))?);
        *entry = Some(artifact.clone());
        Ok(artifact)
    }

    async fn exchange(&self, key: SpecKey, request: &BuildRequest) -> Result<B::Artifact, PeerError> {
        self.stop_serving(key).await;

        let directory = self.node.directory().clone();
        let directory_key = key.directory_key(&self.function);
        let lookup = |source| PeerError::Consumer {
            key,
            source: ConsumerFailure::Lookup {
                key: directory_key.clone(),
                source,
            },
        };
        let (role, generation) = if self.options.elect {
            let election = elect(directory.as_ref(), &directory_key, self.node.id())
                .await
                .map_err(|source| PeerError::Election { key, source })?;
            (election.role, Some(election.generation))
        } else {
            (Role::Producer, None)
        };

        let mut stale = closed_locations(directory.as_ref(), &directory_key)
            .await
            .map_err(lookup)?;
        let consumer_cancel = CancellationToken::new();
        let producer = match role {
            Role::Producer => {
                // Anything already published belongs to an earlier producer.
                stale.extend(directory.get(&directory_key).await.map_err(lookup)?);
                Some(self.spawn_producer(key, request, generation, consumer_cancel.clone()))
            }
            Role::Consumer => None,
        };

        let consumer =
            Consumer::new(self.backend.clone(), directory.clone(), self.options.clone()).ignoring(stale);
        let failure = match consumer
            .run(key, &self.function, &request.symbols, consumer_cancel)
            .await
        {
            Ok(artifact) => {
                if let Some(serving) = producer {
                    self.serving.lock().insert(key, serving);
                }
                return Ok(artifact);
            }
            Err(failure) => failure,
        };

        match (producer, generation) {
            (Some(Serving { stop, task }), _) => {
                stop.cancel();
                match task.await {
                    Ok(Err(source)) => return Err(PeerError::Producer { key, source }),
                    Ok(Ok(_)) => {}
                    Err(e) => tracing::warn!(%key, error = %e, "producer task failed"),
                }
            }
            // Nothing usable came from the elected producer; let the next
            // resolve elect another one.
            (None, Some(generation)) => match &failure {
                ConsumerFailure::Timeout { .. } => {
                    release(directory.as_ref(), &directory_key, Some(generation), None).await;
                }
                ConsumerFailure::Transfer { location, .. } => {
                    release(
                        directory.as_ref(),
                        &directory_key,
                        Some(generation),
                        Some(location.as_str()),
                    )
                    .await;
                }
                _ => {}
            },
            (None, None) => {}
        }
        Err(PeerError::Consumer { key, source: failure })
    }

    fn spawn_producer(
        &self,
        key: SpecKey,
        request: &BuildRequest,
        generation: Option<u64>,
        consumer_cancel: CancellationToken,
    ) -> Serving {
        let options = PeerOptions {
            transfers: self.options.transfers + 1,
            ..self.options.clone()
        };
        let directory = self.node.directory().clone();
        let producer = Producer::new(self.backend.clone(), directory.clone(), options);
        let function = self.function.clone();
        let request = request.clone();
        let stop = self.node.background_token();
        let shutdown = stop.clone();
        let task = self.node.spawn_background(async move {
            let result = producer.run(key, &function, &request, shutdown).await;
            if result.is_err() {
                consumer_cancel.cancel();
            }
            let location = producer.location();
            let directory_key = key.directory_key(&function);
            release(directory.as_ref(), &directory_key, generation, location.as_deref()).await;
            result
        });
        Serving { stop, task }
    }

    /// Stops a background producer left from an earlier exchange of `key`
    /// and waits until its endpoint is released.
    async fn stop_serving(&self, key: SpecKey) {
        let previous = self.serving.lock().remove(&key);
        if let Some(Serving { stop, task }) = previous {
            stop.cancel();
            if let Err(e) = task.await {
                tracing::warn!(%key, error = %e, "producer task failed");
            }
        }
    }

    /// Whether a background producer for `key` is still serving.
    pub fn is_serving(&self, key: SpecKey) -> bool {
        self.serving
            .lock()
            .get(&key)
            .is_some_and(|serving| !serving.task.is_finished())
    }

    /// Returns the cached artifact for `key` as-is, without re-linking.
    pub fn peek(&self, key: SpecKey) -> Option<Arc<B::Artifact>> {
        self.slots.get(key)
    }

    /// Releases the loaded code for `key` but keeps the entry.
    pub fn fold(&self, key: SpecKey) -> bool {
        match self.slots.get(key) {
            Some(artifact) => {
                artifact.fold();
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `key` and releases its loaded code. The next
    /// resolve runs the exchange again, and a producer still serving the
    /// old binary stops.
    pub fn invalidate(&self, key: SpecKey) -> bool {
        if let Some(serving) = self.serving.lock().get(&key) {
            serving.stop.cancel();
        }
        match self.slots.take(key) {
            Some(artifact) => {
                artifact.fold();
                true
            }
            None => false,
        }
    }

    /// Whether `key` has a cached entry.
    pub fn contains(&self, key: SpecKey) -> bool {
        self.slots.contains(key)
    }

    /// Cached keys in key order.
    pub fn keys(&self) -> Vec<SpecKey> {
        self.slots.keys()
    }
}

impl<B: Backend> Drop for DistributedCache<B> {
    fn drop(&mut self) {
        for serving in self.serving.get_mut().values() {
            serving.stop.cancel();
        }
    }
}

/// Records `location` as closed and retires `generation`, in that order.
async fn release(
    directory: &dyn Directory,
    directory_key: &str,
    generation: Option<u64>,
    location: Option<&str>,
) {
    if let Some(location) = location {
        if let Err(e) = close_location(directory, directory_key, location).await {
            tracing::warn!(key = %directory_key, %location, error = %e, "failed to record closed endpoint");
        }
    }
    if let Some(generation) = generation {
        if let Err(e) = retire(directory, directory_key, generation).await {
            tracing::warn!(key = %directory_key, generation, error = %e, "failed to retire producer generation");
        }
    }
}
