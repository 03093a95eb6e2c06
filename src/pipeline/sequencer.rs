//! Sequencer - per-owner key assignment and persistence.
//!
//! The single worker that drains the ingestion queue. For each action it
//! takes the owner's next sequence key from the store's atomic counter and
//! writes, in order:
//!
//! 1. `ZADD {index} {score} {valueKey}`
//! 2. `EXPIRE {index} {ttl + grace}`
//! 3. `SET {valueKey} {bytes}`
//! 4. `EXPIRE {valueKey} {ttl}`
//!
//! then hands the keyed action to the dispatcher. The index outlives the
//! values by the grace period so loads can prune stale members before the
//! whole index expires.
//!
//! A backend failure is not retried. The failing action completes with the
//! error, the handle is poisoned, and every action still queued completes
//! with `Error::Poisoned` without touching the store.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use super::action::{ActionPhase, CompletedAction, PendingAction};
use super::keys::KeySpace;
use super::poison::PoisonLatch;
use super::stats::PipelineStats;
use crate::domain::ports::{Clock, SequenceKey, TimeWindowStore, WindowScore};
use crate::error::{Error, Result};

pub struct Sequencer {
    store: Arc<dyn TimeWindowStore>,
    clock: Arc<dyn Clock>,
    keys: KeySpace,
    ttl_seconds: u64,
    index_ttl_seconds: u64,
    poison: PoisonLatch,
    stats: Arc<PipelineStats>,
    ingest_rx: mpsc::Receiver<PendingAction>,
    completion_tx: mpsc::Sender<CompletedAction>,
}

impl Sequencer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TimeWindowStore>,
        clock: Arc<dyn Clock>,
        keys: KeySpace,
        ttl_seconds: u64,
        index_ttl_seconds: u64,
        poison: PoisonLatch,
        stats: Arc<PipelineStats>,
        ingest_rx: mpsc::Receiver<PendingAction>,
        completion_tx: mpsc::Sender<CompletedAction>,
    ) -> Self {
        Self {
            store,
            clock,
            keys,
            ttl_seconds,
            index_ttl_seconds,
            poison,
            stats,
            ingest_rx,
            completion_tx,
        }
    }

    /// Run until the ingestion queue is closed and drained, or the
    /// dispatcher goes away.
    pub async fn run(mut self) {
        let _guard = self.poison.guard("sequencer");
        info!(
            namespace = self.keys.namespace(),
            ttl = self.ttl_seconds,
            "Sequencer started"
        );

        while let Some(mut action) = self.ingest_rx.recv().await {
            let result = if self.poison.is_set() {
                Err(Error::Poisoned)
            } else {
                match self.persist(&mut action).await {
                    Ok(key) => Ok(key),
                    Err(e) => {
                        error!(
                            owner = %action.owner,
                            phase = %action.phase,
                            "Persistence failed, poisoning handle: {}",
                            e
                        );
                        self.poison.set();
                        Err(e)
                    }
                }
            };

            match &result {
                Ok(_) => self.stats.record_persisted(),
                Err(_) => self.stats.record_failed(),
            }

            if self.completion_tx.send(action.complete(result)).await.is_err() {
                error!("Callback dispatcher is gone, poisoning handle");
                self.poison.set();
                break;
            }
        }

        info!(namespace = self.keys.namespace(), "Sequencer stopped");
    }

    /// Assign the next key for the action's owner and write index + value.
    #[instrument(skip(self, action), fields(owner = %action.owner))]
    async fn persist(&self, action: &mut PendingAction) -> Result<SequenceKey> {
        let counter = self.keys.counter_key(action.owner);
        let key = SequenceKey(self.store.increment_counter(&counter).await?);
        action.key = Some(key);
        action.phase = ActionPhase::Sequenced;

        let score = WindowScore::from_datetime(self.clock.now());
        let index = self.keys.index_key(action.owner);
        let value_key = self.keys.value_key(action.owner, key);

        self.store.add_to_index(&index, score, &value_key).await?;
        self.store.set_ttl(&index, self.index_ttl_seconds).await?;

        self.store
            .set_value(&value_key, action.value.clone())
            .await?;
        self.store.set_ttl(&value_key, self.ttl_seconds).await?;

        action.phase = ActionPhase::Persisted;
        debug!(key = %key, score = %score, bytes = action.value.len(), "Persisted value");
        Ok(key)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryTimeWindowStore, ManualClock};
    use crate::config::ValueKeyLayout;
    use crate::domain::ports::OwnerId;
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use tokio::sync::oneshot;

    struct Harness {
        store: Arc<InMemoryTimeWindowStore>,
        poison: PoisonLatch,
        ingest_tx: mpsc::Sender<PendingAction>,
        completion_rx: mpsc::Receiver<CompletedAction>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn_sequencer(ttl_seconds: u64) -> Harness {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryTimeWindowStore::with_clock(clock.clone()));
        let poison = PoisonLatch::new();
        let (ingest_tx, ingest_rx) = mpsc::channel(8);
        let (completion_tx, completion_rx) = mpsc::channel(8);

        let sequencer = Sequencer::new(
            store.clone(),
            clock,
            KeySpace::new("seq", ValueKeyLayout::Shared),
            ttl_seconds,
            ttl_seconds + 5,
            poison.clone(),
            Arc::new(PipelineStats::new()),
            ingest_rx,
            completion_tx,
        );
        let handle = tokio::spawn(sequencer.run());

        Harness {
            store,
            poison,
            ingest_tx,
            completion_rx,
            handle,
        }
    }

    fn action(owner: u64, value: &'static [u8]) -> PendingAction {
        PendingAction::new(OwnerId(owner), Bytes::from_static(value), Box::new(|_| {}))
    }

    #[tokio::test]
    async fn test_assigns_increasing_keys_per_owner() {
        let mut h = spawn_sequencer(10);

        h.ingest_tx.send(action(1, b"a")).await.unwrap();
        h.ingest_tx.send(action(1, b"b")).await.unwrap();
        h.ingest_tx.send(action(2, b"c")).await.unwrap();

        let first = h.completion_rx.recv().await.unwrap();
        let second = h.completion_rx.recv().await.unwrap();
        let third = h.completion_rx.recv().await.unwrap();

        assert_eq!(first.result.unwrap(), SequenceKey(1));
        assert_eq!(second.result.unwrap(), SequenceKey(2));
        assert_eq!(third.owner, OwnerId(2));
        assert_eq!(third.result.unwrap(), SequenceKey(1));
    }

    #[tokio::test]
    async fn test_writes_index_and_value_with_ttls() {
        let mut h = spawn_sequencer(10);

        h.ingest_tx.send(action(0xab, b"hello")).await.unwrap();
        let done = h.completion_rx.recv().await.unwrap();
        assert_eq!(done.phase, ActionPhase::Persisted);

        assert_eq!(
            h.store.get_value("seq_1").await.unwrap(),
            Some(Bytes::from_static(b"hello"))
        );
        assert_eq!(h.store.ttl_seconds("seq_1"), Some(10));
        assert_eq!(h.store.ttl_seconds("seq_ab_set"), Some(15));
        assert!(h.store.contains_key("seq_ab_idx"));
        assert_eq!(h.store.ttl_seconds("seq_ab_idx"), None);
    }

    #[tokio::test]
    async fn test_backend_failure_poisons_and_fails_rest() {
        let mut h = spawn_sequencer(10);
        h.store.inject_failure("SET");

        h.ingest_tx.send(action(1, b"a")).await.unwrap();
        let failed = h.completion_rx.recv().await.unwrap();
        assert_eq!(failed.phase, ActionPhase::Failed);
        assert_eq!(failed.key, Some(SequenceKey(1)));
        assert_matches!(failed.result, Err(Error::Backend { command: "SET", .. }));
        assert!(h.poison.is_set());

        h.store.clear_failure();
        let commands_before = h.store.command_count();

        h.ingest_tx.send(action(1, b"b")).await.unwrap();
        let skipped = h.completion_rx.recv().await.unwrap();
        assert_matches!(skipped.result, Err(Error::Poisoned));
        assert!(skipped.key.is_none());
        assert_eq!(h.store.command_count(), commands_before);
    }

    #[tokio::test]
    async fn test_stops_when_ingest_closed() {
        let h = spawn_sequencer(10);
        drop(h.ingest_tx);
        h.handle.await.unwrap();
        assert!(!h.poison.is_set());
    }

    #[tokio::test]
    async fn test_dispatcher_gone_poisons() {
        let h = spawn_sequencer(10);
        drop(h.completion_rx);

        let (tx, rx) = oneshot::channel::<()>();
        let pending = PendingAction::new(
            OwnerId(1),
            Bytes::from_static(b"x"),
            Box::new(move |_| {
                let _ = tx.send(());
            }),
        );
        h.ingest_tx.send(pending).await.unwrap();
        h.handle.await.unwrap();

        assert!(h.poison.is_set());
        // The callback was dropped with the undeliverable action.
        assert!(rx.await.is_err());
    }
}
