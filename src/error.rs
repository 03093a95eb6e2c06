//! Error types for the time-window cache

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while writing to or reading from the window cache
#[derive(Error, Debug)]
pub enum Error {
    /// Redis command or protocol error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Backend rejected a command (non-Redis adapters)
    #[error("Backend command '{command}' failed: {reason}")]
    Backend {
        command: &'static str,
        reason: String,
    },

    /// Could not establish the backend connection
    #[error("Failed to connect to {address}: {reason}")]
    Connection { address: String, reason: String },

    /// Connection establishment exceeded the configured timeout
    #[error("Connection to {address} timed out after {timeout:?}")]
    ConnectionTimeout { address: String, timeout: Duration },

    /// An index member did not carry a decodable sequence key
    #[error("Failed to decode sequence key from index member '{member}'")]
    MemberDecode { member: String },

    /// A previous backend failure latched the handle as unusable
    #[error("Window cache is poisoned by an earlier backend failure")]
    Poisoned,

    /// The handle was shut down before the submission completed
    #[error("Window cache is shut down")]
    ShutDown,

    /// The pipeline workers need a tokio runtime to run on
    #[error("No tokio runtime to spawn pipeline workers on: {0}")]
    NoRuntime(String),

    /// A pipeline worker terminated by panicking
    #[error("Pipeline worker '{worker}' panicked")]
    WorkerPanicked { worker: &'static str },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Owner identifier could not be parsed
    #[error("Invalid owner identifier: {0}")]
    InvalidOwner(String),
}

impl Error {
    /// Whether this error came from the remote store rather than the pipeline.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Error::Redis(_)
                | Error::Backend { .. }
                | Error::Connection { .. }
                | Error::ConnectionTimeout { .. }
        )
    }
}
