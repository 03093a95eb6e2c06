//! Domain Ports (Port/Adapter Pattern)
//!
//! This module defines the abstractions the window pipeline depends on.
//! Infrastructure adapters implement these traits to provide concrete
//! backends.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Pipeline Layer                           │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │            TimeWindowStore │ Clock                   │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  RedisTimeWindowStore │ InMemoryTimeWindowStore     │    │
//! │  │  SystemClock │ ManualClock                          │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Owner identifier (value object).
///
/// Opaque 64-bit tenant id. Key names render it as unpadded lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub u64);

impl OwnerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl std::fmt::LowerHex for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<u64> for OwnerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for OwnerId {
    type Err = Error;

    /// Accepts decimal (`42`) or `0x`-prefixed hexadecimal (`0x2a`).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        parsed
            .map(OwnerId)
            .map_err(|e| Error::InvalidOwner(format!("{}: {}", s, e)))
    }
}

/// Per-owner sequence key assigned by the store's atomic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceKey(pub u64);

impl SequenceKey {
    /// Returned by a load that found no members.
    pub const MAX: SequenceKey = SequenceKey(u64::MAX);

    pub fn new(key: u64) -> Self {
        Self(key)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Insertion timestamp used as the sorted-index score.
///
/// Encoded as the integer `YYYYMMDDhhmmss` (UTC, one-second resolution), so
/// numeric, lexical and chronological order all agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowScore(pub u64);

impl WindowScore {
    /// Lowest representable score; used when a cutoff underflows.
    pub const MIN: WindowScore = WindowScore(0);

    /// Derive the score for a point in time.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let year = at.year().max(0) as u64;
        Self(
            year * 10_000_000_000
                + u64::from(at.month()) * 100_000_000
                + u64::from(at.day()) * 1_000_000
                + u64::from(at.hour()) * 10_000
                + u64::from(at.minute()) * 100
                + u64::from(at.second()),
        )
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WindowScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One sorted-index member with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub member: String,
    pub score: WindowScore,
}

impl IndexEntry {
    pub fn new(member: impl Into<String>, score: WindowScore) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

// =============================================================================
// Clock Port
// =============================================================================

/// Port for reading wall-clock time.
///
/// Scores and load cutoffs are both derived from this, so tests can drive
/// the time window deterministically.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

// =============================================================================
// Time Window Store Port
// =============================================================================

/// Port for the remote counter / sorted-set / key-value store.
///
/// These are the only store access points the pipeline uses. Every
/// operation is a remote call; failures are propagated, never retried.
#[async_trait]
pub trait TimeWindowStore: Send + Sync {
    /// Atomically increment a counter, returning the new value.
    async fn increment_counter(&self, name: &str) -> Result<u64>;

    /// Add (or re-score) a member in a sorted index.
    async fn add_to_index(&self, index: &str, score: WindowScore, member: &str) -> Result<()>;

    /// Set a key's time-to-live in whole seconds.
    ///
    /// A TTL of zero expires the key immediately.
    async fn set_ttl(&self, name: &str, seconds: u64) -> Result<()>;

    /// Store a value blob.
    async fn set_value(&self, key: &str, value: Bytes) -> Result<()>;

    /// Fetch a value blob, `None` if absent or expired.
    async fn get_value(&self, key: &str) -> Result<Option<Bytes>>;

    /// Remove all index members scored at or below `max_score`.
    ///
    /// Returns the number of members removed.
    async fn prune_index(&self, index: &str, max_score: WindowScore) -> Result<u64>;

    /// Members scored within `[min_score, max_score]` with their scores,
    /// highest score first, capped at `limit`. `max_score = None` means
    /// unbounded. Members sharing a score come back in descending member
    /// order.
    async fn range_index_descending(
        &self,
        index: &str,
        min_score: WindowScore,
        max_score: Option<WindowScore>,
        limit: usize,
    ) -> Result<Vec<IndexEntry>>;
}

// =============================================================================
// Tests
// =============================================================================
