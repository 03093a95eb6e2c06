//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the
//! Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │              TimeWindowStore │ Clock                        │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ RedisTimeWindowStore │ InMemoryTimeWindowStore             │ │
//! │  │ SystemClock │ ManualClock                                  │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use kvwindow::adapters::RedisTimeWindowStore;
//! use kvwindow::domain::TimeWindowStore;
//!
//! let store = RedisTimeWindowStore::connect(Transport::Tcp, ":6379", timeout).await?;
//! let next = store.increment_counter("app_2a_idx").await?;
//! ```

mod clock;
mod memory;
mod redis_store;

pub use clock::{ManualClock, SystemClock};
pub use memory::InMemoryTimeWindowStore;
pub use redis_store::RedisTimeWindowStore;
