//! Wire protocol shared by client and server.
//!
//! Both directions carry newline-delimited JSON objects over one TCP stream. The
//! client sends [`Request`] values; the server answers every request with a
//! [`ServerMessage::Reply`] and, interleaved with replies, pushes
//! [`ServerMessage::ReceiveStockUpdate`] and [`ServerMessage::NewStockAdded`] events.
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::StockError;
use crate::symbol::Symbol;

/// Event name of a pushed price update.
pub const RECEIVE_STOCK_UPDATE: &str = "ReceiveStockUpdate";
/// Event name of a pushed new-symbol announcement.
pub const NEW_STOCK_ADDED: &str = "NewStockAdded";

/// Symbol together with its current price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Normalized ticker.
    pub symbol: Symbol,
    /// Last known price.
    pub price: Decimal,
}

impl Quote {
    /// Creates a quote pair.
    pub fn new(symbol: Symbol, price: Decimal) -> Self {
        Quote { symbol, price }
    }
}

/// Operation sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Join the symbol's group, creating the symbol if unknown.
    Subscribe {
        /// Target symbol.
        symbol: Symbol,
    },
    /// Leave the symbol's group.
    Unsubscribe {
        /// Target symbol.
        symbol: Symbol,
    },
    /// Current price of one symbol.
    GetPrice {
        /// Target symbol.
        symbol: Symbol,
    },
    /// Current prices of every tracked symbol.
    ListAll,
    /// Start tracking a symbol without subscribing to it.
    AddStock {
        /// Target symbol.
        symbol: Symbol,
    },
    /// Overwrite a symbol's price.
    UpdateStock {
        /// Target symbol.
        symbol: Symbol,
        /// New price, must be positive.
        price: Decimal,
    },
    /// Stop tracking a symbol.
    DeleteStock {
        /// Target symbol.
        symbol: Symbol,
    },
    /// Keep-alive.
    Ping,
}

impl Request {
    /// Decode one request line.
    pub fn from_line(line: &str) -> Result<Self, StockError> {
        serde_json::from_str(line.trim())
            .map_err(|e| StockError::InvalidArgument(format!("malformed request: {}", e)))
    }

    /// Encode the request as a JSON line terminated by `\n`.
    pub fn to_json_line(&self) -> Result<Vec<u8>, StockError> {
        let mut json = serde_json::to_vec(self)?;
        json.push(b'\n');
        Ok(json)
    }
}

/// Outcome of a request, modelled on HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum Status {
    /// 200
    Ok,
    /// 201
    Created,
    /// 400
    BadRequest,
    /// 404
    NotFound,
    /// 409
    Conflict,
    /// 500
    InternalError,
}

impl Status {
    /// Numeric HTTP-equivalent code.
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::Conflict => 409,
            Status::InternalError => 500,
        }
    }

    /// `true` for 2xx codes.
    pub fn is_success(self) -> bool {
        matches!(self, Status::Ok | Status::Created)
    }
}

/// Event pushed to connections without a preceding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// New price of a symbol the connection is subscribed to.
    ReceiveStockUpdate(Quote),
    /// A symbol was created through a subscription.
    NewStockAdded(Symbol),
}

impl PushEvent {
    /// Event name as seen by clients.
    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::ReceiveStockUpdate(_) => RECEIVE_STOCK_UPDATE,
            PushEvent::NewStockAdded(_) => NEW_STOCK_ADDED,
        }
    }
}

/// Every message the server writes to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Answer to the request read just before.
    Reply {
        /// Result code.
        status: Status,
        /// Quotes returned by `GetPrice` / `ListAll`.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        quotes: Vec<Quote>,
        /// Error description for failed requests.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Pushed price update.
    ReceiveStockUpdate {
        /// Updated symbol.
        symbol: Symbol,
        /// New price.
        price: Decimal,
    },
    /// Pushed new-symbol announcement.
    NewStockAdded {
        /// Created symbol.
        symbol: Symbol,
    },
}

impl ServerMessage {
    /// Successful reply without payload.
    pub fn ok(status: Status) -> Self {
        ServerMessage::Reply {
            status,
            quotes: Vec::new(),
            message: None,
        }
    }

    /// Successful reply carrying quotes.
    pub fn with_quotes(quotes: Vec<Quote>) -> Self {
        ServerMessage::Reply {
            status: Status::Ok,
            quotes,
            message: None,
        }
    }

    /// Failed reply built from an error.
    pub fn error(err: &StockError) -> Self {
        ServerMessage::Reply {
            status: err.status(),
            quotes: Vec::new(),
            message: Some(err.to_string()),
        }
    }

    /// Decode one server line.
    pub fn from_line(line: &str) -> Result<Self, StockError> {
        Ok(serde_json::from_str(line.trim())?)
    }

    /// Encode the message as a JSON line terminated by `\n`.
    pub fn to_json_line(&self) -> Result<Vec<u8>, StockError> {
        let mut json = serde_json::to_vec(self)?;
        json.push(b'\n');
        Ok(json)
    }
}

impl From<PushEvent> for ServerMessage {
    fn from(event: PushEvent) -> Self {
        match event {
            PushEvent::ReceiveStockUpdate(quote) => ServerMessage::ReceiveStockUpdate {
                symbol: quote.symbol,
                price: quote.price,
            },
            PushEvent::NewStockAdded(symbol) => ServerMessage::NewStockAdded { symbol },
        }
    }
}
