//! Server assembly.
//!
//! [`StockServer::start`] wires the pieces described by a [`ServerConfig`]:
//!
//! 1. the price source (HTTP provider behind a cache, only when a URL is configured);
//! 2. the price store, preloaded from the symbols file if one is given;
//! 3. the subscription router and the request service on top of it;
//! 4. the background threads: refresh scheduler, keep-alive checker, router event
//!    logger and the TCP accept loop.
//!
//! The returned [`RunningServer`] owns those threads. [`RunningServer::shutdown`] stops
//! accepting, stops the refresh cadence, closes every connection and joins everything.

use crossbeam_channel::{Receiver, Sender, bounded, select};
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::BufReader;
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use stock_common::symbol::SymbolParser;
use stock_common::{StockError, Symbol};

use crate::config::ServerConfig;
use crate::model::ping_monitor::{PingMonitor, spawn_timeout_checker};
use crate::model::price_source::{CachedPriceSource, HttpPriceSource, PriceSource};
use crate::model::price_store::PriceStore;
use crate::model::refresh_scheduler::{RefreshScheduler, SchedulerHandle};
use crate::model::router::{RouterEvent, SubscriptionRouter};
use crate::model::stock_service::StockService;
use crate::receiver::CommandReceiver;

/// How often silent connections are looked for.
const KEEPALIVE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Builder of a server instance.
pub struct StockServer {
    config: ServerConfig,
}

impl StockServer {
    /// Server described by `config`.
    pub fn new(config: ServerConfig) -> Self {
        StockServer { config }
    }

    /// Bind the listener and start every background thread.
    pub fn start(self) -> Result<RunningServer, StockError> {
        let config = self.config;

        let store = Arc::new(match build_source(&config) {
            Some(source) => PriceStore::with_source(source),
            None => PriceStore::new(),
        });
        if let Some(path) = &config.symbols_file {
            let added = preload_symbols(&store, path)?;
            info!("Preloaded {} symbols from {}", added, path.display());
        }

        let router = Arc::new(SubscriptionRouter::new(
            Arc::clone(&store),
            config.outbound_capacity,
        ));
        let service = Arc::new(StockService::new(Arc::clone(&router)));

        let receiver = CommandReceiver::new(&config.bind_addr)?;
        let local_addr = receiver.local_addr()?;

        let scheduler = RefreshScheduler::new(
            Arc::clone(&store),
            Arc::clone(&router),
            config.refresh_interval,
            config.refresh_mode,
        )
        .start();

        let monitor = config
            .keepalive_timeout
            .map(|timeout| Arc::new(Mutex::new(PingMonitor::new(timeout))));
        let checker = monitor.as_ref().map(|monitor| {
            let (stop_tx, stop_rx) = bounded::<()>(1);
            let thread = spawn_timeout_checker(
                Arc::clone(monitor),
                Arc::clone(&router),
                KEEPALIVE_CHECK_INTERVAL,
                stop_rx,
            );
            (stop_tx, thread)
        });

        let events = {
            let (stop_tx, stop_rx) = bounded::<()>(1);
            let thread = spawn_event_logger(router.notifications()?, stop_rx);
            (stop_tx, thread)
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let accept = {
            let service = Arc::clone(&service);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                if let Err(e) = receiver.receive_loop(service, monitor, shutdown) {
                    error!("Receiver loop failed: {:?}", e);
                }
            })
        };

        info!("Stock server listening on {}", local_addr);
        Ok(RunningServer {
            local_addr,
            service,
            shutdown,
            scheduler,
            accept: Some(accept),
            checker,
            events: Some(events),
        })
    }
}

/// Handle of a started server. Dropping it shuts the server down.
pub struct RunningServer {
    local_addr: SocketAddr,
    service: Arc<StockService>,
    shutdown: Arc<AtomicBool>,
    scheduler: SchedulerHandle,
    accept: Option<JoinHandle<()>>,
    checker: Option<(Sender<()>, JoinHandle<()>)>,
    events: Option<(Sender<()>, JoinHandle<()>)>,
}

impl RunningServer {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The request service.
    pub fn service(&self) -> &Arc<StockService> {
        &self.service
    }

    /// The price store.
    pub fn store(&self) -> &Arc<PriceStore> {
        self.service.store()
    }

    /// The subscription router.
    pub fn router(&self) -> &Arc<SubscriptionRouter> {
        self.service.router()
    }

    /// Stop the server and wait for its threads. Calling it again is a no-op.
    pub fn shutdown(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down stock server");

        // The accept loop only sees the flag once it accepts something.
        if let Err(e) = TcpStream::connect(wake_addr(self.local_addr)) {
            warn!("Failed to wake the accept loop: {}", e);
        }
        if let Some(accept) = self.accept.take() {
            if accept.join().is_err() {
                error!("Accept thread panicked");
            }
        }

        self.scheduler.stop();
        stop_thread(self.checker.take(), "Keep-alive checker");
        stop_thread(self.events.take(), "Router event logger");

        match self.router().disconnect_all() {
            Ok(closed) => info!("Closed {} connections", closed),
            Err(e) => error!("Failed to close connections: {}", e),
        }
        info!("Stock server stopped");
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Add every symbol listed in `path` to `store`. Returns how many were new.
pub fn preload_symbols(store: &PriceStore, path: &Path) -> Result<usize, StockError> {
    let file = File::open(path)?;
    let symbols = Symbol::parse_from_file(BufReader::new(file))?;
    Ok(symbols.iter().filter(|symbol| store.add(symbol)).count())
}

fn build_source(config: &ServerConfig) -> Option<Arc<dyn PriceSource>> {
    let url = config.quote_api_url.as_deref()?;
    info!("Using quote provider {} (cache {:?})", url, config.cache_ttl);
    let http = HttpPriceSource::new(url, config.quote_api_key.clone(), config.fetch_timeout);
    Some(Arc::new(CachedPriceSource::new(http, config.cache_ttl)))
}

/// Log router activity at debug level until `stop_rx` fires or closes.
fn spawn_event_logger(events: Receiver<RouterEvent>, stop_rx: Receiver<()>) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            select! {
                recv(stop_rx) -> _ => break,
                recv(events) -> event => match event {
                    Ok(RouterEvent::SymbolAdded(symbol)) => debug!("Symbol {} added", symbol),
                    Ok(RouterEvent::PriceUpdated { quote, delivered }) => debug!(
                        "{} = {} pushed to {} subscribers",
                        quote.symbol, quote.price, delivered
                    ),
                    Err(_) => break,
                },
            }
        }
    })
}

fn stop_thread(handle: Option<(Sender<()>, JoinHandle<()>)>, name: &str) {
    if let Some((stop_tx, thread)) = handle {
        let _ = stop_tx.try_send(());
        if thread.join().is_err() {
            error!("{} thread panicked", name);
        }
    }
}

/// Loopback address to reach a listener bound to `addr`, including wildcard binds.
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    let mut target = addr;
    if target.ip().is_unspecified() {
        match target {
            SocketAddr::V4(_) => target.set_ip([127, 0, 0, 1].into()),
            SocketAddr::V6(_) => target.set_ip(std::net::Ipv6Addr::LOCALHOST.into()),
        }
    }
    target
}
