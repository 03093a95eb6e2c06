//! kvwindow CLI
//!
//! Operator tool for poking at a window cache namespace on a live Redis.
//!
//! ```text
//! kvwindow --namespace events store --owner 0x2a --value '{"foo":"bar"}'
//! kvwindow --namespace events load --owner 0x2a --limit 10
//! ```

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kvwindow::{OwnerId, Transport, WindowCache, WindowCacheConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// kvwindow - per-owner time-windowed cache on Redis
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Key namespace
    #[arg(long, env = "KVWINDOW_NAMESPACE", default_value = "kvwindow")]
    namespace: String,

    /// Backend transport (tcp or unix)
    #[arg(long, env = "KVWINDOW_TRANSPORT", default_value = "tcp")]
    transport: Transport,

    /// Backend address (host:port or socket path)
    #[arg(long, env = "KVWINDOW_ADDRESS", default_value = "127.0.0.1:6379")]
    address: String,

    /// Value retention window in seconds
    #[arg(long, env = "KVWINDOW_TTL_SECONDS", default_value = "60")]
    ttl_seconds: u64,

    /// Connection timeout in seconds
    #[arg(long, env = "KVWINDOW_CONNECT_TIMEOUT_SECONDS", default_value = "10")]
    connect_timeout_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store one value and print its sequence key
    Store {
        /// Owner id (decimal or 0x-prefixed hex)
        #[arg(long)]
        owner: OwnerId,

        /// Value to store, taken as UTF-8 bytes
        #[arg(long)]
        value: String,
    },

    /// Print the newest values of an owner as JSON
    Load {
        /// Owner id (decimal or 0x-prefixed hex)
        #[arg(long)]
        owner: OwnerId,

        /// Maximum number of values
        #[arg(long, default_value = "100")]
        limit: usize,
    },
}

#[derive(Serialize)]
struct LoadOutput {
    last_key: u64,
    values: Vec<String>,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = WindowCacheConfig {
        namespace: args.namespace.clone(),
        transport: args.transport,
        address: args.address.clone(),
        ttl: Duration::from_secs(args.ttl_seconds),
        connect_timeout: Duration::from_secs(args.connect_timeout_seconds),
        ..Default::default()
    };

    let cache = WindowCache::open_with_config(config)
        .await
        .context("failed to open window cache")?;

    let config = cache.config();
    info!("Window cache ready");
    info!("  Namespace: {}", config.namespace);
    info!("  Backend: {}://{}", config.transport, config.address);
    info!("  TTL: {}s", config.ttl_seconds());

    match args.command {
        Command::Store { owner, value } => {
            let key = cache
                .store_value_and_wait(owner, value.into_bytes())
                .await
                .with_context(|| format!("failed to store value for owner {}", owner))?;
            println!("{}", key);
        }
        Command::Load { owner, limit } => {
            let (last_key, values) = cache
                .load_values(owner, limit)
                .await
                .with_context(|| format!("failed to load values for owner {}", owner))?;
            let output = LoadOutput {
                last_key: last_key.as_u64(),
                values: values
                    .iter()
                    .map(|v| String::from_utf8_lossy(v).into_owned())
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    cache.shutdown().await?;
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr so stdout stays machine-readable.
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
