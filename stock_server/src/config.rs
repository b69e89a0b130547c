//! Command-line arguments and runtime configuration of the stock server.
//!
//! `Args` is the `clap` surface of the binary; [`Args::into_config`] turns it into the
//! plain [`ServerConfig`] the library consumes. `ServerConfig::default()` gives the
//! reference behavior: synthetic prices refreshed every 5 seconds, no external source.
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use stock_common::net::{COMMAND_PORT, addr};

use crate::model::price_source::{ApiKey, DEFAULT_CACHE_TTL};
use crate::model::refresh_scheduler::{DEFAULT_REFRESH_INTERVAL, RefreshMode};
use crate::model::router::DEFAULT_OUTBOUND_CAPACITY;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about = "Live stock price fan-out server", long_about = None)]
pub struct Args {
    /// Address the TCP listener binds to.
    #[clap(long, default_value_t = addr("0.0.0.0", COMMAND_PORT))]
    pub bind: String,

    /// Milliseconds between two price refreshes.
    #[clap(long, default_value_t = 5000)]
    pub refresh_interval_ms: u64,

    /// How refreshes compute new prices.
    #[clap(long, value_enum, default_value_t = RefreshMode::Synthetic)]
    pub refresh_mode: RefreshMode,

    /// Base URL of the quote provider, e.g. https://api.twelvedata.com.
    /// Without it every price is synthetic.
    #[clap(long)]
    pub quote_api_url: Option<String>,

    /// API key appended to provider requests. Redacted from debug output.
    #[clap(long, env = "QUOTE_API_KEY", hide_env_values = true)]
    pub quote_api_key: Option<ApiKey>,

    /// Seconds a fetched provider price is reused.
    #[clap(long, default_value_t = 300)]
    pub cache_ttl_secs: u64,

    /// Timeout of one provider request, in seconds.
    #[clap(long, default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Disconnect clients silent for this many seconds; 0 disables the check.
    #[clap(long, default_value_t = 0)]
    pub keepalive_timeout_secs: u64,

    /// Capacity of each connection's outbound queue.
    #[clap(long, default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_capacity: usize,

    /// File with symbols to track from startup.
    /// Symbols may be separated by commas, spaces, or new lines.
    #[clap(long)]
    pub symbols_file: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace.
    #[clap(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Runtime configuration described by these arguments.
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind,
            refresh_interval: Duration::from_millis(self.refresh_interval_ms.max(1)),
            refresh_mode: self.refresh_mode,
            quote_api_url: self.quote_api_url,
            quote_api_key: self.quote_api_key,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            keepalive_timeout: (self.keepalive_timeout_secs > 0)
                .then(|| Duration::from_secs(self.keepalive_timeout_secs)),
            outbound_capacity: self.outbound_capacity,
            symbols_file: self.symbols_file,
        }
    }
}

/// Runtime configuration of a server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listener address.
    pub bind_addr: String,
    /// Period of the refresh scheduler.
    pub refresh_interval: Duration,
    /// Refresh strategy.
    pub refresh_mode: RefreshMode,
    /// Quote provider base URL; `None` disables external prices.
    pub quote_api_url: Option<String>,
    /// Quote provider API key.
    pub quote_api_key: Option<ApiKey>,
    /// Freshness window of provider prices.
    pub cache_ttl: Duration,
    /// Timeout of one provider request.
    pub fetch_timeout: Duration,
    /// Silence after which a connection is dropped; `None` disables the check.
    pub keepalive_timeout: Option<Duration>,
    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,
    /// Symbols to add at startup.
    pub symbols_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: addr("0.0.0.0", COMMAND_PORT),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            refresh_mode: RefreshMode::Synthetic,
            quote_api_url: None,
            quote_api_key: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: Duration::from_secs(10),
            keepalive_timeout: None,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            symbols_file: None,
        }
    }
}
