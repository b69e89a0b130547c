//! Request handlers.
//!
//! `StockService` turns each inbound [`Request`] into a [`ServerMessage::Reply`] by
//! calling the price store and the subscription router. Symbols reach it already
//! normalized (the wire type cannot hold anything else). Errors map to reply statuses
//! through `StockError::status`: unknown symbol → 404, duplicate add → 409, rejected
//! price or symbol → 400.

use log::{debug, info};
use rust_decimal::Decimal;
use std::sync::Arc;
use stock_common::{Quote, Request, ServerMessage, Status, StockError, Symbol};

use crate::model::ConnectionId;
use crate::model::price_store::PriceStore;
use crate::model::router::SubscriptionRouter;

/// Inbound operations on top of the store and router.
pub struct StockService {
    store: Arc<PriceStore>,
    router: Arc<SubscriptionRouter>,
}

impl StockService {
    /// Service over `router` and the store it creates symbols in.
    pub fn new(router: Arc<SubscriptionRouter>) -> Self {
        StockService {
            store: router.store().clone(),
            router,
        }
    }

    /// The router used for subscriptions.
    pub fn router(&self) -> &Arc<SubscriptionRouter> {
        &self.router
    }

    /// The price store.
    pub fn store(&self) -> &Arc<PriceStore> {
        &self.store
    }

    /// Execute `request` on behalf of `connection` and build the reply.
    pub fn handle(&self, connection: ConnectionId, request: Request) -> ServerMessage {
        debug!("Connection {} requested {:?}", connection, request);
        let result = match request {
            Request::Subscribe { symbol } => self.subscribe(connection, &symbol),
            Request::Unsubscribe { symbol } => self.unsubscribe(connection, &symbol),
            Request::GetPrice { symbol } => self
                .get_price(&symbol)
                .map(|quote| ServerMessage::with_quotes(vec![quote])),
            Request::ListAll => Ok(ServerMessage::with_quotes(self.list_all())),
            Request::AddStock { symbol } => self.add_stock(&symbol),
            Request::UpdateStock { symbol, price } => self.update_stock(&symbol, price),
            Request::DeleteStock { symbol } => self.delete_stock(&symbol),
            Request::Ping => Ok(ServerMessage::ok(Status::Ok)),
        };

        result.unwrap_or_else(|e| {
            debug!("Request of connection {} failed: {}", connection, e);
            ServerMessage::error(&e)
        })
    }

    /// Join `symbol`'s group, creating the symbol when unknown.
    pub fn subscribe(&self, connection: ConnectionId, symbol: &Symbol) -> Result<ServerMessage, StockError> {
        self.router.subscribe(connection, symbol)?;
        Ok(ServerMessage::ok(Status::Ok))
    }

    /// Leave `symbol`'s group. Succeeds even if the connection was not subscribed.
    pub fn unsubscribe(&self, connection: ConnectionId, symbol: &Symbol) -> Result<ServerMessage, StockError> {
        self.router.unsubscribe(connection, symbol)?;
        Ok(ServerMessage::ok(Status::Ok))
    }

    /// Current price of `symbol`. Unknown symbols and unset (zero) prices are not found.
    pub fn get_price(&self, symbol: &Symbol) -> Result<Quote, StockError> {
        match self.store.get(symbol) {
            Some(record) if record.price > Decimal::ZERO => Ok(record.quote()),
            _ => Err(StockError::NotFound(symbol.to_string())),
        }
    }

    /// Every tracked symbol with its price.
    pub fn list_all(&self) -> Vec<Quote> {
        self.store.quotes()
    }

    /// Track `symbol` without subscribing. Conflict if it already exists.
    pub fn add_stock(&self, symbol: &Symbol) -> Result<ServerMessage, StockError> {
        if self.store.add(symbol) {
            Ok(ServerMessage::ok(Status::Created))
        } else {
            Err(StockError::Conflict(symbol.to_string()))
        }
    }

    /// Overwrite `symbol`'s price.
    pub fn update_stock(&self, symbol: &Symbol, price: Decimal) -> Result<ServerMessage, StockError> {
        if self.store.update(symbol, price)? {
            info!("Stock {} set to {}", symbol, price);
            Ok(ServerMessage::ok(Status::Ok))
        } else {
            Err(StockError::NotFound(symbol.to_string()))
        }
    }

    /// Stop tracking `symbol` and drop its subscription group.
    pub fn delete_stock(&self, symbol: &Symbol) -> Result<ServerMessage, StockError> {
        match self.router.delete_symbol(symbol)? {
            Some(members) => {
                info!("Stock {} deleted, {} subscribers dropped", symbol, members.len());
                Ok(ServerMessage::ok(Status::Ok))
            }
            None => Err(StockError::NotFound(symbol.to_string())),
        }
    }
}
