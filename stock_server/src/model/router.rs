//! Subscription router: group membership and targeted fan-out.
//!
//! The router owns the [`SubscriptionIndex`] and the outbound channel of every registered
//! connection, both behind one `RwLock`:
//!
//! - `register`, `subscribe`, `unsubscribe`, `on_disconnect` and `delete_symbol` take the
//!   write lock, so each is a single transaction over both adjacency maps;
//! - `delete_symbol` also removes the store record under that lock, and `subscribe`
//!   only links a symbol the store still tracks, so a group never outlives its symbol;
//! - `broadcast` and `broadcast_all` take the read lock only long enough to clone the
//!   target senders, then deliver with the lock released.
//!
//! Delivery is fire-and-forget per connection: outbound channels are bounded and written
//! with `try_send`. A full queue drops that one event for that one connection; a closed
//! queue means the writer is gone, and the connection is cleaned up as if it had
//! disconnected. Neither stalls delivery to anyone else.
//!
//! Observers can follow the router through [`SubscriptionRouter::notifications`], which
//! yields a [`RouterEvent`] whenever a subscription creates a symbol or a price is fanned
//! out.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use stock_common::{PushEvent, Quote, ServerMessage, StockError, Symbol};

use crate::model::ConnectionId;
use crate::model::price_store::PriceStore;
use crate::model::subscription_index::SubscriptionIndex;

/// Default capacity of each connection's outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// How long a request reply may wait for room in a full outbound queue.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// How many times `subscribe` re-seeds a symbol that was deleted under it.
const SUBSCRIBE_ATTEMPTS: usize = 3;

/// Notification emitted to router observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    /// A subscription created a previously unknown symbol.
    SymbolAdded(Symbol),
    /// A new price was fanned out to the symbol's group.
    PriceUpdated {
        /// Symbol and its new price.
        quote: Quote,
        /// Connections the update was queued for.
        delivered: usize,
    },
}

struct RouterState {
    index: SubscriptionIndex,
    outlets: HashMap<ConnectionId, Sender<ServerMessage>>,
}

/// Routes push events to the connections interested in them.
pub struct SubscriptionRouter {
    store: Arc<PriceStore>,
    state: RwLock<RouterState>,
    next_id: AtomicU64,
    outbound_capacity: usize,
    listeners: Mutex<Vec<Sender<RouterEvent>>>,
}

impl SubscriptionRouter {
    /// Router creating symbols in `store`, with per-connection queues of `outbound_capacity`.
    pub fn new(store: Arc<PriceStore>, outbound_capacity: usize) -> Self {
        SubscriptionRouter {
            store,
            state: RwLock::new(RouterState {
                index: SubscriptionIndex::new(),
                outlets: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
            outbound_capacity: outbound_capacity.max(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// The store symbols are created in.
    pub fn store(&self) -> &Arc<PriceStore> {
        &self.store
    }

    /// Register a new connection.
    ///
    /// The returned receiver yields every message queued for the connection; it
    /// disconnects once the connection is dropped by [`Self::on_disconnect`].
    pub fn register(&self) -> Result<(ConnectionId, Receiver<ServerMessage>), StockError> {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = bounded(self.outbound_capacity);

        let mut state = self.state.write()?;
        state.outlets.insert(id, tx);
        state.index.add_connection(id);
        info!(
            "Connection {} registered. Total connections: {}",
            id,
            state.outlets.len()
        );
        Ok((id, rx))
    }

    /// `true` if `connection` is registered.
    pub fn is_registered(&self, connection: ConnectionId) -> Result<bool, StockError> {
        Ok(self.state.read()?.outlets.contains_key(&connection))
    }

    /// Subscribe `connection` to `symbol`, creating the symbol if needed.
    ///
    /// A newly created symbol is announced with `NewStockAdded` to every connection.
    /// Returns whether the symbol was created. Subscribing twice is a no-op.
    pub fn subscribe(&self, connection: ConnectionId, symbol: &Symbol) -> Result<bool, StockError> {
        if !self.is_registered(connection)? {
            return Err(StockError::UnknownConnection(connection.0));
        }

        let mut created = false;
        for _ in 0..SUBSCRIBE_ATTEMPTS {
            // Seeding may block on the price source, so it runs outside the lock.
            if self.store.add(symbol) {
                created = true;
                let announced = self.broadcast_all(PushEvent::NewStockAdded(symbol.clone()))?;
                info!("New stock {} announced to {} connections", symbol, announced);
                self.notify(RouterEvent::SymbolAdded(symbol.clone()));
            }

            let mut state = self.state.write()?;
            if !state.outlets.contains_key(&connection) {
                return Err(StockError::UnknownConnection(connection.0));
            }
            // A concurrent delete may have won the race since the add above.
            if !self.store.contains(symbol) {
                debug!("{} deleted while {} was subscribing, retrying", symbol, connection);
                continue;
            }
            if state.index.link(connection, symbol) {
                debug!("Connection {} subscribed to {}", connection, symbol);
            }
            return Ok(created);
        }
        Err(StockError::NotFound(symbol.to_string()))
    }

    /// Remove `connection` from `symbol`'s group. The symbol itself stays tracked.
    ///
    /// Returns `false` if the connection was not subscribed.
    pub fn unsubscribe(&self, connection: ConnectionId, symbol: &Symbol) -> Result<bool, StockError> {
        let removed = self.state.write()?.index.unlink(connection, symbol);
        if removed {
            debug!("Connection {} unsubscribed from {}", connection, symbol);
        }
        Ok(removed)
    }

    /// Forget `connection`: leave every group and close its outbound queue.
    ///
    /// Must be called on every connection loss; safe to call more than once. Returns the
    /// symbols the connection was subscribed to.
    pub fn on_disconnect(&self, connection: ConnectionId) -> Result<Vec<Symbol>, StockError> {
        let mut state = self.state.write()?;
        let had_outlet = state.outlets.remove(&connection).is_some();
        let symbols = state.index.remove_connection(connection);
        if had_outlet {
            info!(
                "Connection {} disconnected, left {} groups. Total connections: {}",
                connection,
                symbols.len(),
                state.outlets.len()
            );
        }
        Ok(symbols)
    }

    /// Disconnect every registered connection. Returns how many were dropped.
    pub fn disconnect_all(&self) -> Result<usize, StockError> {
        let ids: Vec<ConnectionId> = self.state.read()?.outlets.keys().copied().collect();
        for id in &ids {
            self.on_disconnect(*id)?;
        }
        Ok(ids.len())
    }

    /// Stop tracking `symbol`: remove its store record and drop its group in one step.
    ///
    /// Returns the former group members, or `None` if the symbol was not tracked.
    pub fn delete_symbol(&self, symbol: &Symbol) -> Result<Option<Vec<ConnectionId>>, StockError> {
        let mut state = self.state.write()?;
        if !self.store.remove(symbol) {
            return Ok(None);
        }
        let members = state.index.remove_symbol(symbol);
        debug!("Deleted {} and its group of {} members", symbol, members.len());
        Ok(Some(members))
    }

    /// Queue `ReceiveStockUpdate(symbol, price)` for exactly the members of `symbol`'s group.
    ///
    /// Returns the number of connections the update was queued for.
    pub fn broadcast(&self, symbol: &Symbol, price: Decimal) -> Result<usize, StockError> {
        let targets = {
            let state = self.state.read()?;
            state
                .index
                .subscribers(symbol)
                .into_iter()
                .filter_map(|id| state.outlets.get(&id).map(|tx| (id, tx.clone())))
                .collect::<Vec<_>>()
        };

        let quote = Quote::new(symbol.clone(), price);
        let delivered = self.deliver(targets, PushEvent::ReceiveStockUpdate(quote.clone()))?;
        self.notify(RouterEvent::PriceUpdated { quote, delivered });
        Ok(delivered)
    }

    /// Queue `event` for every registered connection regardless of subscriptions.
    pub fn broadcast_all(&self, event: PushEvent) -> Result<usize, StockError> {
        let targets = {
            let state = self.state.read()?;
            state
                .outlets
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect::<Vec<_>>()
        };
        self.deliver(targets, event)
    }

    fn deliver(
        &self,
        targets: Vec<(ConnectionId, Sender<ServerMessage>)>,
        event: PushEvent,
    ) -> Result<usize, StockError> {
        let name = event.name();
        let message = ServerMessage::from(event);
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, tx) in targets {
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue of connection {} is full, dropping {}", id, name);
                }
                Err(TrySendError::Disconnected(_)) => dead.push(id),
            }
        }

        for id in dead {
            debug!("Connection {} went away during {}", id, name);
            self.on_disconnect(id)?;
        }
        Ok(delivered)
    }

    /// Queue a reply for `connection`, waiting briefly if its queue is full.
    pub fn send_to(&self, connection: ConnectionId, message: ServerMessage) -> Result<(), StockError> {
        let tx = self
            .state
            .read()?
            .outlets
            .get(&connection)
            .cloned()
            .ok_or(StockError::UnknownConnection(connection.0))?;

        tx.send_timeout(message, REPLY_TIMEOUT)
            .map_err(|e| StockError::ChannelSend(format!("connection {}: {}", connection, e)))
    }

    /// Channel of [`RouterEvent`]s. Dropping the receiver unsubscribes the observer.
    pub fn notifications(&self) -> Result<Receiver<RouterEvent>, StockError> {
        let (tx, rx) = unbounded();
        self.listeners.lock()?.push(tx);
        Ok(rx)
    }

    fn notify(&self, event: RouterEvent) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Members of `symbol`'s group.
    pub fn subscribers(&self, symbol: &Symbol) -> Result<Vec<ConnectionId>, StockError> {
        Ok(self.state.read()?.index.subscribers(symbol))
    }

    /// Symbols `connection` is subscribed to.
    pub fn symbols_of(&self, connection: ConnectionId) -> Result<Vec<Symbol>, StockError> {
        Ok(self.state.read()?.index.symbols_of(connection))
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> Result<usize, StockError> {
        Ok(self.state.read()?.outlets.len())
    }

    /// `true` when the index maps agree and the index tracks exactly the registered
    /// connections.
    pub fn is_consistent(&self) -> Result<bool, StockError> {
        let state = self.state.read()?;
        let registered = state
            .index
            .connections()
            .iter()
            .all(|id| state.outlets.contains_key(id))
            && state.outlets.keys().all(|id| state.index.has_connection(*id));
        Ok(state.index.is_consistent() && registered)
    }
}
