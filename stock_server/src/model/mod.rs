//! Core engine of the stock server.
//!
//! This module groups the state and background work behind the transport:
//! - `price_record` — per-symbol price value and synthetic random walk.
//! - `price_source` — external quote provider adapter and its freshness cache.
//! - `price_store` — concurrent symbol → price registry.
//! - `subscription_index` — bidirectional symbol ↔ connection index.
//! - `router` — subscription transactions and targeted fan-out.
//! - `refresh_scheduler` — cancellable periodic price refresh.
//! - `stock_service` — request handlers on top of the store and router.
//! - `ping_monitor` — in-memory keep-alive tracker for connection timeouts.

use std::fmt;

pub mod ping_monitor;
pub mod price_record;
pub mod price_source;
pub mod price_store;
pub mod refresh_scheduler;
pub mod router;
pub mod stock_service;
pub mod subscription_index;

/// Opaque identifier of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
