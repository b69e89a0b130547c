//! Keep-alive state tracker for client connections.
//!
//! This module provides a lightweight, in-memory monitor that tracks the last time a
//! connection sent anything (a request or a `Ping`). It exposes three core operations:
//!
//! - `PingMonitor::update_ping(id)` — record fresh activity for a connection.
//! - `PingMonitor::check_timeouts()` — return the connections that exceeded the timeout
//!   and forget them.
//! - `PingMonitor::remove(id)` — forget a connection that closed on its own.
//!
//! Time is measured with `std::time::Instant`, which is monotonic. The monitor is not
//! synchronized; [`spawn_timeout_checker`] shares it behind a `Mutex` and disconnects
//! silent connections through the router, which catches half-open sockets that never
//! report an error to their reader.

use crossbeam_channel::{Receiver, select, tick};
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::model::ConnectionId;
use crate::model::router::SubscriptionRouter;

/// Tracks connection activity and determines inactivity based on a timeout.
pub struct PingMonitor {
    /// Last observed activity per connection.
    clients: HashMap<ConnectionId, Instant>,
    /// Threshold after which a connection is considered dead.
    timeout: Duration,
}

impl PingMonitor {
    /// Create a new instance of PingMonitor
    pub fn new(timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            timeout,
        }
    }

    /// Record activity of `id`
    pub fn update_ping(&mut self, id: ConnectionId) {
        self.clients.insert(id, Instant::now());
    }

    /// Forget `id`
    pub fn remove(&mut self, id: ConnectionId) {
        self.clients.remove(&id);
    }

    /// Remove and return every connection silent for longer than the timeout
    pub fn check_timeouts(&mut self) -> Vec<ConnectionId> {
        let now = Instant::now();
        let timeout = self.timeout;
        let mut timed_out = Vec::new();

        self.clients.retain(|id, last_ping| {
            if now.duration_since(*last_ping) > timeout {
                timed_out.push(*id);
                false
            } else {
                true
            }
        });
        timed_out
    }

    #[cfg(test)]
    fn is_client_active(&self, id: ConnectionId) -> bool {
        self.clients
            .get(&id)
            .is_some_and(|last_ping| last_ping.elapsed() <= self.timeout)
    }
}

/// Periodically disconnect timed-out connections until `stop_rx` fires or closes.
pub fn spawn_timeout_checker(
    monitor: Arc<Mutex<PingMonitor>>,
    router: Arc<SubscriptionRouter>,
    check_interval: Duration,
    stop_rx: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let ticker = tick(check_interval);
        loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(ticker) -> _ => {
                    let timed_out = match monitor.lock() {
                        Ok(mut monitor) => monitor.check_timeouts(),
                        Err(e) => {
                            error!("Ping monitor lock poisoned: {}", e);
                            break;
                        }
                    };
                    for id in timed_out {
                        warn!("Connection {} closed: ping timeout", id);
                        if let Err(e) = router.on_disconnect(id) {
                            error!("Failed to disconnect {}: {}", id, e);
                        }
                    }
                },
            }
        }
        info!("Keep-alive checker stopped");
    })
}
