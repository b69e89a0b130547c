//! Live stock price fan-out server.
//!
//! Clients connect over TCP and exchange newline-delimited JSON. Each connection may
//! subscribe to any number of ticker symbols; subscribing to an unknown symbol starts
//! tracking it and announces it to everyone. A background scheduler refreshes every
//! tracked price on a fixed cadence and pushes the new value to that symbol's
//! subscribers only.
//!
//! - `config` — command-line arguments and runtime configuration.
//! - `model` — price store, subscription router, scheduler and request handlers.
//! - `receiver` — TCP accept loop and per-connection request reader.
//! - `connection` — per-connection writer draining the outbound queue.
//! - `server` — assembly of all of the above and graceful shutdown.
#![warn(missing_docs)]
pub mod config;
pub mod connection;
pub mod model;
pub mod receiver;
pub mod server;

pub use config::{Args, ServerConfig};
pub use server::{RunningServer, StockServer};
