//! Command-line arguments for the stock client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::Parser;
use std::path::PathBuf;
use stock_common::net::{COMMAND_PORT, addr};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about = "Subscribe to live stock prices", long_about = None)]
pub struct Args {
    /// Server address as `host:port`.
    #[clap(long, default_value_t = addr("127.0.0.1", COMMAND_PORT))]
    pub server: String,

    /// Comma separated symbols to subscribe to, e.g. `AAPL,MSFT`.
    #[clap(long)]
    pub symbols: Option<String>,

    /// Path to a text file with symbols to subscribe to.
    /// Symbols may be separated by commas, spaces, or new lines.
    #[clap(long)]
    pub path: Option<String>,

    /// Print every tracked symbol with its price before subscribing.
    #[clap(long)]
    pub list: bool,

    /// Send a keep-alive `Ping` every this many milliseconds; 0 disables it.
    #[clap(long, default_value_t = stock_common::net::PING_INTERVAL_MS)]
    pub ping_interval_ms: u64,

    /// Log level: error, warn, info, debug, trace.
    #[clap(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// `--path` with surrounding whitespace and matching quotes removed.
    ///
    /// This allows passing Windows paths in quotes without breaking parsing.
    pub fn normalized_path(&self) -> Option<PathBuf> {
        self.path.as_deref().map(|raw| {
            let trimmed = raw.trim();
            let no_quotes = trimmed
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(trimmed);
            PathBuf::from(no_quotes)
        })
    }
}
