//! Callback dispatcher.
//!
//! Drains the completion queue and runs each caller's callback on this
//! task, in queue order. Callbacks never run on the submitting task.
//! A panicking callback is not caught: it takes the dispatcher down and
//! poisons the handle.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::action::CompletedAction;
use super::poison::PoisonLatch;
use super::stats::PipelineStats;

pub struct CallbackDispatcher {
    completion_rx: mpsc::Receiver<CompletedAction>,
    poison: PoisonLatch,
    stats: Arc<PipelineStats>,
}

impl CallbackDispatcher {
    pub fn new(
        completion_rx: mpsc::Receiver<CompletedAction>,
        poison: PoisonLatch,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            completion_rx,
            poison,
            stats,
        }
    }

    /// Run until the sequencer closes the completion queue.
    ///
    /// The callback counter is bumped before each callback runs, so a
    /// caller woken by its callback already sees itself counted.
    pub async fn run(mut self) {
        let _guard = self.poison.guard("dispatcher");
        info!("Callback dispatcher started");

        while let Some(completed) = self.completion_rx.recv().await {
            let owner = completed.owner;
            let key = completed.key;
            self.stats.record_callback();
            let phase = completed.fire();
            debug!(owner = %owner, key = ?key, phase = %phase, "Callback fired");
        }

        info!("Callback dispatcher stopped");
    }
}
