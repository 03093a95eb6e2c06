//! Window Cache Configuration

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Constants
// =============================================================================

/// Default ingestion queue capacity
pub const DEFAULT_INGEST_CAPACITY: usize = 100;

/// Default completion queue capacity
pub const DEFAULT_COMPLETION_CAPACITY: usize = 1000;

/// Extra lifetime given to an owner's index beyond the value TTL
pub const DEFAULT_INDEX_GRACE: Duration = Duration::from_secs(5);

/// Default backend connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Transport
// =============================================================================

/// How to reach the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// `host:port`
    #[default]
    Tcp,
    /// Unix domain socket path
    Unix,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp => write!(f, "tcp"),
            Transport::Unix => write!(f, "unix"),
        }
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "unix" => Ok(Transport::Unix),
            other => Err(Error::Config(format!("unknown transport '{}'", other))),
        }
    }
}

// =============================================================================
// Value Key Layout
// =============================================================================

/// Naming scheme for value blob keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKeyLayout {
    /// `{namespace}_{sequence}`. Sequence keys of different owners share
    /// one keyspace, so equal sequence numbers address the same blob.
    #[default]
    Shared,
    /// `{namespace}_{ownerHex}_{sequence}`
    OwnerScoped,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a window cache handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowCacheConfig {
    /// Prefix applied to every key this handle generates
    pub namespace: String,

    /// Backend transport
    pub transport: Transport,

    /// Backend address (`host:port` or socket path)
    pub address: String,

    /// Retention window for stored values
    pub ttl: Duration,

    /// Extra lifetime of the owner index beyond `ttl`
    pub index_grace: Duration,

    /// Capacity of the caller → sequencer queue
    pub ingest_capacity: usize,

    /// Capacity of the sequencer → dispatcher queue
    pub completion_capacity: usize,

    /// Timeout for establishing the backend connection
    pub connect_timeout: Duration,

    /// Value key naming scheme
    pub value_key_layout: ValueKeyLayout,
}

impl Default for WindowCacheConfig {
    fn default() -> Self {
        Self {
            namespace: "kvwindow".to_string(),
            transport: Transport::Tcp,
            address: "127.0.0.1:6379".to_string(),
            ttl: Duration::from_secs(60),
            index_grace: DEFAULT_INDEX_GRACE,
            ingest_capacity: DEFAULT_INGEST_CAPACITY,
            completion_capacity: DEFAULT_COMPLETION_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            value_key_layout: ValueKeyLayout::Shared,
        }
    }
}

impl WindowCacheConfig {
    /// Configuration for the given namespace and TTL, defaults elsewhere.
    pub fn new(namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            ttl,
            ..Default::default()
        }
    }

    /// Value TTL in whole seconds.
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Index TTL in whole seconds (`ttl + index_grace`).
    pub fn index_ttl_seconds(&self) -> u64 {
        self.ttl
            .as_secs()
            .saturating_add(self.index_grace.as_secs())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::Config("namespace must not be empty".into()));
        }
        if self.namespace.chars().any(char::is_whitespace) {
            return Err(Error::Config(
                "namespace must not contain whitespace".into(),
            ));
        }
        if self.address.is_empty() {
            return Err(Error::Config("address must not be empty".into()));
        }
        if self.ingest_capacity == 0 {
            return Err(Error::Config("ingest_capacity must be > 0".into()));
        }
        if self.completion_capacity == 0 {
            return Err(Error::Config("completion_capacity must be > 0".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::Config("connect_timeout must be > 0".into()));
        }
        Ok(())
    }
}
