//! Loader - the sliding-window read path.
//!
//! Runs on the caller's task and talks to the store directly:
//!
//! 1. `cutoff = score(now - ttl)`
//! 2. prune index members scored at or below `cutoff`
//! 3. range `[cutoff, +inf]` descending, capped at `limit`, and rank the
//!    members by (score, sequence key)
//! 4. fetch each member's value
//!
//! The first element of the result is the sequence key of the *last*
//! member processed, which for a descending range is the oldest one
//! returned. With no members it stays at [`SequenceKey::MAX`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, instrument};

use super::keys::KeySpace;
use super::stats::PipelineStats;
use crate::domain::ports::{Clock, OwnerId, SequenceKey, TimeWindowStore, WindowScore};
use crate::error::Result;

/// Values returned by a load, most recent first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedWindow {
    /// Key of the last member processed, `SequenceKey::MAX` if none
    pub last_key: SequenceKey,
    /// Value blobs, most recent first
    pub values: Vec<Bytes>,
}

impl LoadedWindow {
    fn empty() -> Self {
        Self {
            last_key: SequenceKey::MAX,
            values: Vec::new(),
        }
    }

    pub fn into_parts(self) -> (SequenceKey, Vec<Bytes>) {
        (self.last_key, self.values)
    }
}

#[derive(Clone)]
pub struct Loader {
    store: Arc<dyn TimeWindowStore>,
    clock: Arc<dyn Clock>,
    keys: KeySpace,
    ttl: Duration,
    stats: Arc<PipelineStats>,
}

impl Loader {
    pub fn new(
        store: Arc<dyn TimeWindowStore>,
        clock: Arc<dyn Clock>,
        keys: KeySpace,
        ttl: Duration,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            store,
            clock,
            keys,
            ttl,
            stats,
        }
    }

    /// Score at and below which index members are outside the window.
    fn cutoff(&self) -> WindowScore {
        let now = self.clock.now();
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .map(WindowScore::from_datetime)
            .unwrap_or(WindowScore::MIN)
    }

    /// Prune expired members and return up to `limit` newest values.
    ///
    /// Any backend error aborts the whole load; no partial results.
    #[instrument(skip(self), fields(namespace = self.keys.namespace()))]
    pub async fn load(&self, owner: OwnerId, limit: usize) -> Result<LoadedWindow> {
        let index = self.keys.index_key(owner);
        let cutoff = self.cutoff();

        let pruned = self.store.prune_index(&index, cutoff).await?;
        if limit == 0 {
            self.stats.record_load(0, 0, pruned);
            return Ok(LoadedWindow::empty());
        }

        let members = self.newest_members(owner, &index, cutoff, limit).await?;

        let mut window = LoadedWindow::empty();
        window.values.reserve(members.len());
        let mut missing = 0u64;

        for (key, member) in &members {
            window.last_key = *key;
            match self.store.get_value(member).await? {
                Some(value) => window.values.push(value),
                None => {
                    // Value expired between the prune and the read.
                    missing += 1;
                }
            }
        }

        self.stats
            .record_load(window.values.len() as u64, missing, pruned);
        debug!(
            cutoff = %cutoff,
            pruned,
            members = members.len(),
            values = window.values.len(),
            "Loaded window"
        );
        Ok(window)
    }

    /// Up to `limit` in-window members, newest first by (score, sequence key).
    ///
    /// The store orders members that share a score by name, so `_9` ranks
    /// above `_10`. When the limit cuts into the lowest score returned, that
    /// whole score is fetched again before ranking by sequence key.
    async fn newest_members(
        &self,
        owner: OwnerId,
        index: &str,
        cutoff: WindowScore,
        limit: usize,
    ) -> Result<Vec<(SequenceKey, String)>> {
        let mut entries = self
            .store
            .range_index_descending(index, cutoff, None, limit)
            .await?;

        if entries.len() >= limit {
            if let Some(lowest) = entries.last().map(|entry| entry.score) {
                entries.retain(|entry| entry.score != lowest);
                let tied = self
                    .store
                    .range_index_descending(index, lowest, Some(lowest), usize::MAX)
                    .await?;
                entries.extend(tied);
            }
        }

        let mut ranked = entries
            .into_iter()
            .map(|entry| -> Result<_> {
                let key = self.keys.parse_member(owner, &entry.member)?;
                Ok((entry.score, key, entry.member))
            })
            .collect::<Result<Vec<_>>>()?;

        ranked.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        ranked.truncate(limit);

        Ok(ranked
            .into_iter()
            .map(|(_, key, member)| (key, member))
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================
