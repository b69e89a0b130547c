//!
//! Common types and utilities shared by the stock server and client.
//!
//! This crate aggregates:
//! - `error` — unified error type `StockError` used across the workspace.
//! - `result` — handy `Result<T, StockError>` alias.
//! - `symbol` — normalized ticker symbols and parsing helpers shared by both sides.
//! - `command` — JSON line requests, replies and push events exchanged over TCP.
//! - `net` — networking constants and small helpers.
#![warn(missing_docs)]
pub mod command;
pub mod error;
pub mod net;
pub mod result;
pub mod symbol;

pub use command::{PushEvent, Quote, Request, ServerMessage, Status};
pub use error::StockError;
pub use result::Result;
pub use symbol::Symbol;
