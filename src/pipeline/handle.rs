//! Window cache handle.
//!
//! Owns the two pipeline workers and the sending end of the ingestion
//! queue. Dropping the handle closes the queue and lets both workers drain
//! and exit in the background; [`WindowCache::shutdown`] does the same and
//! waits for them.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::action::{ActionPhase, CompletionCallback, PendingAction};
use super::dispatcher::CallbackDispatcher;
use super::keys::KeySpace;
use super::loader::Loader;
use super::poison::PoisonLatch;
use super::sequencer::Sequencer;
use super::stats::{PipelineStats, PipelineStatsSnapshot};
use crate::adapters::{RedisTimeWindowStore, SystemClock};
use crate::config::{Transport, WindowCacheConfig};
use crate::domain::ports::{Clock, OwnerId, SequenceKey, TimeWindowStore};
use crate::error::{Error, Result};

/// Handle to one namespace of the time-window cache.
pub struct WindowCache {
    config: WindowCacheConfig,
    ingest_tx: mpsc::Sender<PendingAction>,
    loader: Loader,
    poison: PoisonLatch,
    stats: Arc<PipelineStats>,
    sequencer: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl std::fmt::Debug for WindowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowCache")
            .field("namespace", &self.config.namespace)
            .field("ttl", &self.config.ttl)
            .field("poisoned", &self.poison.is_set())
            .finish()
    }
}

impl WindowCache {
    /// Connect to Redis and start the pipeline.
    ///
    /// # Errors
    ///
    /// * `Connection` / `ConnectionTimeout` if the backend is unreachable
    pub async fn open(
        namespace: impl Into<String>,
        transport: Transport,
        address: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self> {
        let config = WindowCacheConfig {
            transport,
            address: address.into(),
            ..WindowCacheConfig::new(namespace, ttl)
        };
        Self::open_with_config(config).await
    }

    /// Connect to Redis using a full configuration and start the pipeline.
    ///
    /// # Errors
    ///
    /// * `Config` if the configuration is invalid
    /// * `Connection` / `ConnectionTimeout` if the backend is unreachable
    #[instrument(skip(config), fields(namespace = %config.namespace, address = %config.address))]
    pub async fn open_with_config(config: WindowCacheConfig) -> Result<Self> {
        config.validate()?;
        let store =
            RedisTimeWindowStore::connect(config.transport, &config.address, config.connect_timeout)
                .await?;
        debug!(address = store.address(), "Backend connection established");
        Self::with_store(config, Arc::new(store))
    }

    /// Start the pipeline over any store, using the system clock.
    pub fn with_store(config: WindowCacheConfig, store: Arc<dyn TimeWindowStore>) -> Result<Self> {
        Self::with_store_and_clock(config, store, Arc::new(SystemClock))
    }

    /// Start the pipeline over any store and clock.
    ///
    /// Spawns the sequencer and the callback dispatcher on the current
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// * `Config` if the configuration is invalid
    /// * `NoRuntime` if called outside a tokio runtime
    pub fn with_store_and_clock(
        config: WindowCacheConfig,
        store: Arc<dyn TimeWindowStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| Error::NoRuntime(e.to_string()))?;

        let keys = KeySpace::new(config.namespace.clone(), config.value_key_layout);
        let poison = PoisonLatch::new();
        let stats = Arc::new(PipelineStats::new());

        let (ingest_tx, ingest_rx) = mpsc::channel(config.ingest_capacity);
        let (completion_tx, completion_rx) = mpsc::channel(config.completion_capacity);

        let sequencer = Sequencer::new(
            store.clone(),
            clock.clone(),
            keys.clone(),
            config.ttl_seconds(),
            config.index_ttl_seconds(),
            poison.clone(),
            stats.clone(),
            ingest_rx,
            completion_tx,
        );
        let dispatcher = CallbackDispatcher::new(completion_rx, poison.clone(), stats.clone());
        let loader = Loader::new(store, clock, keys, config.ttl, stats.clone());

        let sequencer = runtime.spawn(sequencer.run());
        let dispatcher = runtime.spawn(dispatcher.run());

        info!(
            namespace = %config.namespace,
            ttl = ?config.ttl,
            ingest_capacity = config.ingest_capacity,
            completion_capacity = config.completion_capacity,
            "Window cache opened"
        );

        Ok(Self {
            config,
            ingest_tx,
            loader,
            poison,
            stats,
            sequencer,
            dispatcher,
        })
    }

    /// Submit a value for persistence.
    ///
    /// Waits while the ingestion queue is full. `on_complete` runs once on
    /// the dispatcher task with the assigned key, or with the error that
    /// stopped persistence.
    ///
    /// # Errors
    ///
    /// * `Poisoned` if an earlier backend failure latched the handle
    /// * `ShutDown` if the pipeline is no longer accepting work
    ///
    /// On error `on_complete` is dropped without being called.
    pub async fn store_value<F>(
        &self,
        owner: OwnerId,
        value: impl Into<Bytes>,
        on_complete: F,
    ) -> Result<()>
    where
        F: FnOnce(Result<SequenceKey>) + Send + 'static,
    {
        self.submit(PendingAction::new(owner, value.into(), Box::new(on_complete)))
            .await
    }

    /// Submit a value and wait until it is persisted.
    ///
    /// # Errors
    ///
    /// Whatever `store_value` or the persistence step returned.
    pub async fn store_value_and_wait(
        &self,
        owner: OwnerId,
        value: impl Into<Bytes>,
    ) -> Result<SequenceKey> {
        let (tx, rx) = oneshot::channel();
        let on_complete: CompletionCallback = Box::new(move |result| {
            let _ = tx.send(result);
        });
        self.submit(PendingAction::new(owner, value.into(), on_complete))
            .await?;

        match rx.await {
            Ok(result) => result,
            // Callback dropped unfired: the pipeline died underneath us.
            Err(_) if self.poison.is_set() => Err(Error::Poisoned),
            Err(_) => Err(Error::ShutDown),
        }
    }

    async fn submit(&self, mut action: PendingAction) -> Result<()> {
        if self.poison.is_set() {
            return Err(Error::Poisoned);
        }

        action.phase = ActionPhase::Queued;
        self.ingest_tx.send(action).await.map_err(|_| {
            if self.poison.is_set() {
                Error::Poisoned
            } else {
                Error::ShutDown
            }
        })?;
        self.stats.record_submitted();
        Ok(())
    }

    /// Load up to `limit` of the owner's newest values within the TTL window.
    ///
    /// Returns the key of the last member processed (`SequenceKey::MAX`
    /// when none were found) and the values, most recent first.
    ///
    /// # Errors
    ///
    /// Any backend failure, or `MemberDecode` for a malformed index member.
    pub async fn load_values(
        &self,
        owner: OwnerId,
        limit: usize,
    ) -> Result<(SequenceKey, Vec<Bytes>)> {
        Ok(self.loader.load(owner, limit).await?.into_parts())
    }

    /// Close the ingestion queue, drain both workers and wait for them.
    ///
    /// Every action already queued is still persisted and its callback run.
    ///
    /// # Errors
    ///
    /// * `WorkerPanicked` if either worker died by panicking
    #[instrument(skip(self), fields(namespace = %self.config.namespace))]
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            ingest_tx,
            sequencer,
            dispatcher,
            stats,
            ..
        } = self;
        drop(ingest_tx);

        let sequencer_result = sequencer.await;
        let dispatcher_result = dispatcher.await;

        if let Err(e) = &sequencer_result {
            warn!("Sequencer terminated abnormally: {}", e);
        }
        if let Err(e) = &dispatcher_result {
            warn!("Callback dispatcher terminated abnormally: {}", e);
        }

        sequencer_result.map_err(|_| Error::WorkerPanicked { worker: "sequencer" })?;
        dispatcher_result.map_err(|_| Error::WorkerPanicked {
            worker: "dispatcher",
        })?;

        let snapshot = stats.snapshot();
        info!(
            submitted = snapshot.submitted,
            persisted = snapshot.persisted,
            failed = snapshot.failed,
            "Window cache shut down"
        );
        Ok(())
    }

    /// Whether a backend failure or worker panic has latched the handle.
    pub fn is_poisoned(&self) -> bool {
        self.poison.is_set()
    }

    /// Current pipeline counters.
    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Configuration this handle was opened with.
    pub fn config(&self) -> &WindowCacheConfig {
        &self.config
    }
}

// =============================================================================
// Tests
// =============================================================================
