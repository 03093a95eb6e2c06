//! Redis Store Adapter
//!
//! Implements the `TimeWindowStore` port against a Redis-compatible server.
//!
//! | Port operation           | Command                                   |
//! |--------------------------|-------------------------------------------|
//! | `increment_counter`      | `INCR name`                               |
//! | `add_to_index`           | `ZADD index score member`                 |
//! | `set_ttl`                | `EXPIRE name seconds`                     |
//! | `set_value`              | `SET key value`                           |
//! | `get_value`              | `GET key`                                 |
//! | `prune_index`            | `ZREMRANGEBYSCORE index -inf max`         |
//! | `range_index_descending` | `ZREVRANGEBYSCORE index max min WITHSCORES LIMIT 0 n`|

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info, instrument};

use crate::config::Transport;
use crate::domain::ports::{IndexEntry, TimeWindowStore, WindowScore};
use crate::error::{Error, Result};

/// Redis-backed store.
///
/// Holds one multiplexed connection; every call clones the handle, so the
/// sequencer and concurrent loaders pipeline over the same socket.
#[derive(Clone)]
pub struct RedisTimeWindowStore {
    conn: MultiplexedConnection,
    address: String,
}

impl std::fmt::Debug for RedisTimeWindowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTimeWindowStore")
            .field("address", &self.address)
            .finish()
    }
}

impl RedisTimeWindowStore {
    /// Connect to a Redis server.
    ///
    /// `address` is `host:port` for TCP (a bare `:port` means localhost) or
    /// a socket path for Unix transport.
    ///
    /// # Errors
    ///
    /// * `Connection` if the URL is invalid or the server refuses
    /// * `ConnectionTimeout` if the handshake exceeds `connect_timeout`
    #[instrument(skip(connect_timeout))]
    pub async fn connect(
        transport: Transport,
        address: &str,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let url = connection_url(transport, address);
        let client = redis::Client::open(url.as_str()).map_err(|e| Error::Connection {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        let conn = tokio::time::timeout(connect_timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| Error::ConnectionTimeout {
                address: address.to_string(),
                timeout: connect_timeout,
            })?
            .map_err(|e| Error::Connection {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        info!("Connected to Redis at {}", url);

        Ok(Self {
            conn,
            address: address.to_string(),
        })
    }

    /// Address this store is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Build a redis-rs connection URL.
fn connection_url(transport: Transport, address: &str) -> String {
    match transport {
        Transport::Tcp if address.starts_with(':') => format!("redis://127.0.0.1{}", address),
        Transport::Tcp => format!("redis://{}", address),
        Transport::Unix => format!("unix://{}", address),
    }
}

/// `LIMIT` count argument; Redis reads a negative count as unbounded.
fn limit_count(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(-1)
}

#[async_trait]
impl TimeWindowStore for RedisTimeWindowStore {
    async fn increment_counter(&self, name: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let next: u64 = redis::cmd("INCR").arg(name).query_async(&mut conn).await?;
        Ok(next)
    }

    async fn add_to_index(&self, index: &str, score: WindowScore, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("ZADD")
            .arg(index)
            .arg(score.as_u64())
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_ttl(&self, name: &str, seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("EXPIRE")
            .arg(name)
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_value(&self, key: &str, value: Bytes) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value.map(Bytes::from))
    }

    async fn prune_index(&self, index: &str, max_score: WindowScore) -> Result<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(index)
            .arg("-inf")
            .arg(max_score.as_u64())
            .query_async(&mut conn)
            .await?;
        debug!(index, removed, "Pruned index");
        Ok(removed)
    }

    async fn range_index_descending(
        &self,
        index: &str,
        min_score: WindowScore,
        max_score: Option<WindowScore>,
        limit: usize,
    ) -> Result<Vec<IndexEntry>> {
        let mut conn = self.conn.clone();
        let max = match max_score {
            Some(score) => score.to_string(),
            None => "+inf".to_string(),
        };
        let scored: Vec<(String, f64)> = redis::cmd("ZREVRANGEBYSCORE")
            .arg(index)
            .arg(max)
            .arg(min_score.as_u64())
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(limit_count(limit))
            .query_async(&mut conn)
            .await?;

        // Scores are whole YYYYMMDDhhmmss values, exact in an f64.
        Ok(scored
            .into_iter()
            .map(|(member, score)| IndexEntry::new(member, WindowScore(score as u64)))
            .collect())
    }
}
