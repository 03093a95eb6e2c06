//! In-Memory Store Adapter
//!
//! Implements the `TimeWindowStore` port in process memory with the same
//! observable semantics as the Redis commands the pipeline relies on:
//! string counters, sorted sets ordered by (score, member), per-key expiry
//! and empty sorted sets disappearing. Expiry is evaluated lazily against an
//! injected `Clock`, so tests can step through a TTL window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::clock::SystemClock;
use crate::domain::ports::{Clock, IndexEntry, TimeWindowStore, WindowScore};
use crate::error::{Error, Result};

/// Value held under a key.
#[derive(Debug, Clone)]
enum Stored {
    Blob(Bytes),
    Index(HashMap<String, WindowScore>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Stored,
    expires_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory store for tests and single-process embedding.
pub struct InMemoryTimeWindowStore {
    keys: RwLock<HashMap<String, Slot>>,
    clock: Arc<dyn Clock>,
    /// Command that should fail on its next invocations
    failing: RwLock<Option<&'static str>>,
    commands: AtomicU64,
}

impl Default for InMemoryTimeWindowStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for InMemoryTimeWindowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTimeWindowStore")
            .field("keys", &self.keys.read().len())
            .field("commands", &self.command_count())
            .finish()
    }
}

impl InMemoryTimeWindowStore {
    /// Create a store that expires keys against the system clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that expires keys against the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            clock,
            failing: RwLock::new(None),
            commands: AtomicU64::new(0),
        }
    }

    /// Make every subsequent invocation of `command` fail.
    ///
    /// Command names follow the Redis verbs: `INCR`, `ZADD`, `EXPIRE`, `SET`,
    /// `GET`, `ZREMRANGEBYSCORE`, `ZREVRANGEBYSCORE`.
    pub fn inject_failure(&self, command: &'static str) {
        *self.failing.write() = Some(command);
    }

    /// Stop failing commands.
    pub fn clear_failure(&self) {
        *self.failing.write() = None;
    }

    /// Number of live (unexpired) keys.
    pub fn key_count(&self) -> usize {
        let now = self.clock.now();
        self.keys
            .read()
            .values()
            .filter(|slot| !slot.is_expired(now))
            .count()
    }

    /// Whether a live key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.keys
            .read()
            .get(key)
            .is_some_and(|slot| !slot.is_expired(now))
    }

    /// Remaining TTL of a key in whole seconds, `None` if absent or persistent.
    pub fn ttl_seconds(&self, key: &str) -> Option<i64> {
        let now = self.clock.now();
        let keys = self.keys.read();
        let slot = keys.get(key).filter(|slot| !slot.is_expired(now))?;
        slot.expires_at.map(|at| (at - now).num_seconds())
    }

    /// Total commands served.
    pub fn command_count(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    fn begin(&self, command: &'static str) -> Result<DateTime<Utc>> {
        self.commands.fetch_add(1, Ordering::Relaxed);
        if *self.failing.read() == Some(command) {
            return Err(Error::Backend {
                command,
                reason: "injected failure".into(),
            });
        }
        Ok(self.clock.now())
    }

    fn wrong_type(command: &'static str) -> Error {
        Error::Backend {
            command,
            reason: "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
        }
    }
}

/// Drop `key` if it has expired, returning the live slot if any.
fn live<'a>(
    keys: &'a mut HashMap<String, Slot>,
    key: &str,
    now: DateTime<Utc>,
) -> Option<&'a mut Slot> {
    if keys.get(key).is_some_and(|slot| slot.is_expired(now)) {
        keys.remove(key);
    }
    keys.get_mut(key)
}

#[async_trait]
impl TimeWindowStore for InMemoryTimeWindowStore {
    async fn increment_counter(&self, name: &str) -> Result<u64> {
        let now = self.begin("INCR")?;
        let mut keys = self.keys.write();

        let current = match live(&mut keys, name, now) {
            Some(Slot {
                value: Stored::Blob(data),
                ..
            }) => std::str::from_utf8(data)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| Error::Backend {
                    command: "INCR",
                    reason: "value is not an integer or out of range".into(),
                })?,
            Some(_) => return Err(Self::wrong_type("INCR")),
            None => 0,
        };

        let next = current.checked_add(1).ok_or_else(|| Error::Backend {
            command: "INCR",
            reason: "increment would overflow".into(),
        })?;
        let encoded = Bytes::from(next.to_string());

        match keys.get_mut(name) {
            Some(slot) => slot.value = Stored::Blob(encoded),
            None => {
                keys.insert(
                    name.to_string(),
                    Slot {
                        value: Stored::Blob(encoded),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(next)
    }

    async fn add_to_index(&self, index: &str, score: WindowScore, member: &str) -> Result<()> {
        let now = self.begin("ZADD")?;
        let mut keys = self.keys.write();

        match live(&mut keys, index, now) {
            Some(Slot {
                value: Stored::Index(members),
                ..
            }) => {
                members.insert(member.to_string(), score);
            }
            Some(_) => return Err(Self::wrong_type("ZADD")),
            None => {
                let mut members = HashMap::new();
                members.insert(member.to_string(), score);
                keys.insert(
                    index.to_string(),
                    Slot {
                        value: Stored::Index(members),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn set_ttl(&self, name: &str, seconds: u64) -> Result<()> {
        let now = self.begin("EXPIRE")?;
        let mut keys = self.keys.write();

        if live(&mut keys, name, now).is_none() {
            return Ok(());
        }
        if seconds == 0 {
            keys.remove(name);
            return Ok(());
        }

        let secs = i64::try_from(seconds).unwrap_or(i64::MAX);
        let expires_at = chrono::Duration::try_seconds(secs)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if let Some(slot) = keys.get_mut(name) {
            slot.expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn set_value(&self, key: &str, value: Bytes) -> Result<()> {
        self.begin("SET")?;
        // SET replaces any previous value and clears its TTL.
        self.keys.write().insert(
            key.to_string(),
            Slot {
                value: Stored::Blob(value),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<Bytes>> {
        let now = self.begin("GET")?;
        let mut keys = self.keys.write();

        match live(&mut keys, key, now) {
            Some(Slot {
                value: Stored::Blob(data),
                ..
            }) => Ok(Some(data.clone())),
            Some(_) => Err(Self::wrong_type("GET")),
            None => Ok(None),
        }
    }

    async fn prune_index(&self, index: &str, max_score: WindowScore) -> Result<u64> {
        let now = self.begin("ZREMRANGEBYSCORE")?;
        let mut keys = self.keys.write();

        let (removed, now_empty) = match live(&mut keys, index, now) {
            Some(Slot {
                value: Stored::Index(members),
                ..
            }) => {
                let before = members.len();
                members.retain(|_, score| *score > max_score);
                ((before - members.len()) as u64, members.is_empty())
            }
            Some(_) => return Err(Self::wrong_type("ZREMRANGEBYSCORE")),
            None => (0, false),
        };

        if now_empty {
            keys.remove(index);
        }
        Ok(removed)
    }

    async fn range_index_descending(
        &self,
        index: &str,
        min_score: WindowScore,
        max_score: Option<WindowScore>,
        limit: usize,
    ) -> Result<Vec<IndexEntry>> {
        let now = self.begin("ZREVRANGEBYSCORE")?;
        let mut keys = self.keys.write();

        let members = match live(&mut keys, index, now) {
            Some(Slot {
                value: Stored::Index(members),
                ..
            }) => members,
            Some(_) => return Err(Self::wrong_type("ZREVRANGEBYSCORE")),
            None => return Ok(Vec::new()),
        };

        let mut in_range: Vec<(&String, WindowScore)> = members
            .iter()
            .filter(|(_, score)| **score >= min_score && max_score.map_or(true, |max| **score <= max))
            .map(|(member, score)| (member, *score))
            .collect();

        // Reverse order of (score, member), as ZREVRANGEBYSCORE returns it.
        in_range.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(a.0)));

        Ok(in_range
            .into_iter()
            .take(limit)
            .map(|(member, score)| IndexEntry::new(member.clone(), score))
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================
