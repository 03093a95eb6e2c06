//! kvwindow - Per-Owner Time-Windowed Write-Behind Cache
//!
//! Callers submit opaque byte values tagged with an owner id. Each value is
//! given the owner's next sequence key by the backing store's atomic
//! counter, written with a TTL, and indexed by insertion time in a
//! per-owner sorted set. Loads prune index entries older than the TTL and
//! return the owner's newest values, most recent first.
//!
//! # Architecture
//!
//! ```text
//! store_value → IngestionQueue → Sequencer → CompletionQueue → Dispatcher → callback
//!                                    │
//! load_values ──────────────────▶ TimeWindowStore (Redis)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use kvwindow::{OwnerId, Transport, WindowCache};
//!
//! let cache = WindowCache::open("events", Transport::Tcp, ":6379", Duration::from_secs(60)).await?;
//!
//! cache
//!     .store_value(OwnerId(42), b"payload".to_vec(), |key| {
//!         tracing::info!("stored as {:?}", key);
//!     })
//!     .await?;
//!
//! let (last_key, values) = cache.load_values(OwnerId(42), 100).await?;
//! cache.shutdown().await?;
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Redis and in-memory store adapters, clocks
//! - [`config`] - Handle configuration
//! - [`domain`] - Value objects and port traits
//! - [`error`] - Error types
//! - [`pipeline`] - Sequencer, dispatcher, loader and the handle

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use adapters::{InMemoryTimeWindowStore, ManualClock, RedisTimeWindowStore, SystemClock};
pub use config::{Transport, ValueKeyLayout, WindowCacheConfig};
pub use domain::{Clock, IndexEntry, OwnerId, SequenceKey, TimeWindowStore, WindowScore};
pub use error::{Error, Result};
pub use pipeline::{PipelineStatsSnapshot, WindowCache};
