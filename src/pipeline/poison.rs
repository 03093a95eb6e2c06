//! Poisoned-handle latch.
//!
//! Set once by any worker that hits a backend failure or panics; never
//! cleared. Submissions check it before enqueueing so callers fail fast
//! instead of queueing behind a dead pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::error;

#[derive(Debug, Clone, Default)]
pub struct PoisonLatch {
    flag: Arc<AtomicBool>,
}

impl PoisonLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Guard that latches the flag if dropped during a panic.
    pub fn guard(&self, worker: &'static str) -> PanicGuard {
        PanicGuard {
            latch: self.clone(),
            worker,
        }
    }
}

/// Latches the poison flag when its worker unwinds.
#[derive(Debug)]
pub struct PanicGuard {
    latch: PoisonLatch,
    worker: &'static str,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(worker = self.worker, "Pipeline worker panicked, poisoning handle");
            self.latch.set();
        }
    }
}
