//! Error types shared between client and server.
//!
//! The `StockError` enum unifies the domain taxonomy (unknown symbol, duplicate symbol,
//! rejected argument, failed external fetch) with the plumbing failures of the
//! workspace (I/O, JSON, channels, poisoned locks), allowing crates to propagate a
//! single error type. [`StockError::status`] maps every variant to the wire status
//! returned to clients.
use std::io;
use std::sync::PoisonError;

use thiserror::Error;

use crate::command::Status;

/// Unified error type shared by client and server.
#[derive(Error, Debug)]
pub enum StockError {
    /// I/O error originating from the standard library or sockets/files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error while parsing a symbols file.
    #[error("Parse symbols file error: {0}")]
    ParseSymbolsFile(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Crossbeam/channel send failed (e.g., receiver dropped); contains a short context string.
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// Installing the Ctrl+C handler failed.
    #[error("Signal handler error: {0}")]
    Signal(String),

    /// Error indicating a poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),

    /// The operation referenced a symbol that is not tracked.
    #[error("Symbol not found: {0}")]
    NotFound(String),

    /// The symbol is already tracked.
    #[error("Symbol already exists: {0}")]
    Conflict(String),

    /// Rejected input: malformed symbol, non-positive price, unparsable request.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The external quote provider could not produce a price.
    #[error("External price fetch failed: {0}")]
    ExternalFetch(String),

    /// The connection id is not registered with the router.
    #[error("Unknown connection: {0}")]
    UnknownConnection(u64),
}

impl StockError {
    /// Wire status reported to a client when a request fails with this error.
    pub fn status(&self) -> Status {
        match self {
            StockError::NotFound(_) => Status::NotFound,
            StockError::Conflict(_) => Status::Conflict,
            StockError::InvalidArgument(_) | StockError::SerdeJson(_) => Status::BadRequest,
            _ => Status::InternalError,
        }
    }
}

impl<T> From<PoisonError<T>> for StockError {
    fn from(err: PoisonError<T>) -> Self {
        StockError::MutexLock(err.to_string())
    }
}
