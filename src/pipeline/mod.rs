//! Write-Behind Ingestion Pipeline
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  IngestionQueue  ┌───────────┐  CompletionQueue  ┌────────────┐
//! │  caller  │ ───────────────▶ │ Sequencer │ ────────────────▶ │ Dispatcher │ ──▶ callback
//! └──────────┘   (bounded 100)  └───────────┘   (bounded 1000)  └────────────┘
//!      │                              │
//!      │ load_values                  │ INCR / ZADD / EXPIRE / SET / EXPIRE
//!      ▼                              ▼
//! ┌──────────┐                 ┌─────────────────┐
//! │  Loader  │ ──────────────▶ │ TimeWindowStore │
//! └──────────┘  prune + range  └─────────────────┘
//! ```
//!
//! Per-owner key uniqueness and ordering come from the store's atomic
//! counter, not from in-process locking. Both queues wait when full.

mod action;
mod dispatcher;
mod handle;
mod keys;
mod loader;
mod poison;
mod sequencer;
mod stats;

pub use action::{ActionPhase, CompletionCallback};
pub use handle::WindowCache;
pub use keys::KeySpace;
pub use loader::LoadedWindow;
pub use stats::{PipelineStats, PipelineStatsSnapshot};
