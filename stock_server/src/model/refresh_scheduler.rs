//! Periodic price refresh and fan-out.
//!
//! The `RefreshScheduler` runs a background thread that, once per period, snapshots the
//! tracked symbols, computes a new price for each one and hands it to the router for
//! fan-out to that symbol's subscribers.
//!
//! Cancellation is cooperative: the loop multiplexes the timer and a stop channel with
//! crossbeam `select!`, so [`SchedulerHandle::stop`] ends it without waiting for the next
//! tick, and then joins the thread.
//!
//! A symbol that disappears between the snapshot and its refresh is skipped, and a failed
//! broadcast is logged; neither ends the loop.

use clap::ValueEnum;
use crossbeam_channel::{Sender, bounded, select, tick};
use log::{debug, error, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use strum_macros::{Display, EnumString};

use crate::model::price_store::PriceStore;
use crate::model::router::SubscriptionRouter;

/// Default refresh period.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// How each tick computes new prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Display, EnumString)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum RefreshMode {
    /// Bounded random walk.
    #[default]
    Synthetic,
    /// Re-fetch through the external source, random walk when it fails.
    External,
}

/// Refreshes every tracked symbol on a fixed cadence.
pub struct RefreshScheduler {
    store: Arc<PriceStore>,
    router: Arc<SubscriptionRouter>,
    period: Duration,
    mode: RefreshMode,
}

impl RefreshScheduler {
    /// Create a scheduler; nothing runs until [`Self::start`].
    pub fn new(
        store: Arc<PriceStore>,
        router: Arc<SubscriptionRouter>,
        period: Duration,
        mode: RefreshMode,
    ) -> Self {
        RefreshScheduler {
            store,
            router,
            period,
            mode,
        }
    }

    /// Refresh every tracked symbol once and fan out the new prices.
    ///
    /// Returns the number of symbols refreshed; an empty store is a no-op.
    pub fn run_once(&self) -> usize {
        let symbols = self.store.list_symbols();
        if symbols.is_empty() {
            return 0;
        }

        let mut refreshed = 0;
        for symbol in symbols {
            let price = match self.mode {
                RefreshMode::Synthetic => self.store.tick(&symbol),
                RefreshMode::External => self.store.refresh(&symbol),
            };
            let Some(price) = price else {
                debug!("{} was removed before its refresh", symbol);
                continue;
            };
            refreshed += 1;

            match self.router.broadcast(&symbol, price) {
                Ok(delivered) => debug!("{} -> {} delivered to {}", symbol, price, delivered),
                Err(e) => error!("Failed to broadcast {}: {}", symbol, e),
            }
        }
        refreshed
    }

    /// Start the background thread.
    pub fn start(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let period = self.period;

        let thread = thread::spawn(move || {
            info!(
                "Refresh scheduler started: every {:?}, {} mode",
                period, self.mode
            );
            let ticker = tick(period);
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        self.run_once();
                    },
                }
            }
            info!("Refresh scheduler stopped");
        });

        SchedulerHandle {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }
    }
}

/// Owner of a running scheduler thread. Dropping it stops the scheduler.
pub struct SchedulerHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal the loop to stop and wait for the thread to finish.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Refresh scheduler thread panicked");
            }
        }
    }

    /// `true` until [`Self::stop`] has been called.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::router::RouterEvent;
    use std::time::Instant;
    use stock_common::{ServerMessage, Symbol};

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).unwrap()
    }

    fn setup() -> (Arc<PriceStore>, Arc<SubscriptionRouter>) {
        let store = Arc::new(PriceStore::new());
        let router = Arc::new(SubscriptionRouter::new(store.clone(), 64));
        (store, router)
    }

    #[test]
    fn test_run_once_empty_store_is_noop() {
        let (store, router) = setup();
        let events = router.notifications().unwrap();
        let scheduler =
            RefreshScheduler::new(store, router, Duration::from_secs(1), RefreshMode::Synthetic);

        assert_eq!(scheduler.run_once(), 0);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_run_once_updates_subscribers_only() {
        let (store, router) = setup();
        let (c1, rx1) = router.register().unwrap();
        let (_c2, rx2) = router.register().unwrap();
        let (aapl, msft) = (symbol("AAPL"), symbol("MSFT"));
        router.subscribe(c1, &aapl).unwrap();
        store.add(&msft);
        rx1.try_iter().count();
        rx2.try_iter().count();

        let scheduler = RefreshScheduler::new(
            store.clone(),
            router,
            Duration::from_secs(1),
            RefreshMode::Synthetic,
        );
        assert_eq!(scheduler.run_once(), 2);

        let updates: Vec<ServerMessage> = rx1.try_iter().collect();
        assert_eq!(updates.len(), 1);
        match &updates[0] {
            ServerMessage::ReceiveStockUpdate { symbol, price } => {
                assert_eq!(symbol, &aapl);
                assert_eq!(*price, store.get(&aapl).unwrap().price);
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert_eq!(rx2.try_iter().count(), 0);
    }

    #[test]
    fn test_started_scheduler_ticks_and_stops_promptly() {
        let (store, router) = setup();
        let events = router.notifications().unwrap();
        store.add(&symbol("TSLA"));

        let mut handle = RefreshScheduler::new(
            store,
            router,
            Duration::from_millis(20),
            RefreshMode::Synthetic,
        )
        .start();

        let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(event, RouterEvent::PriceUpdated { .. }));
        assert!(handle.is_running());

        handle.stop();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_stop_does_not_wait_for_period() {
        let (store, router) = setup();
        let mut handle =
            RefreshScheduler::new(store, router, Duration::from_secs(3600), RefreshMode::Synthetic)
                .start();

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_refresh_mode_parsing() {
        assert_eq!("external".parse::<RefreshMode>().unwrap(), RefreshMode::External);
        assert_eq!("Synthetic".parse::<RefreshMode>().unwrap(), RefreshMode::Synthetic);
        assert_eq!(RefreshMode::External.to_string(), "external");
    }
}
