//! Human-readable rendering of server messages.
//!
//! Pushed events carry no timestamp on the wire, so the client stamps them with the
//! local time they were received at.
use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use stock_common::ServerMessage;

/// One line describing `message`, received at `at`.
pub fn render<Tz>(message: &ServerMessage, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let time = at.format("%H:%M:%S%.3f");
    match message {
        ServerMessage::ReceiveStockUpdate { symbol, price } => {
            format!("[{}] QUOTE {} Price={:.2}", time, symbol, price)
        }
        ServerMessage::NewStockAdded { symbol } => {
            format!("[{}] NEW STOCK {}", time, symbol)
        }
        ServerMessage::Reply {
            status,
            quotes,
            message,
        } => {
            let mut line = format!("[{}] REPLY {} {}", time, status.code(), status);
            if let Some(message) = message {
                line.push_str(&format!(": {}", message));
            }
            for quote in quotes {
                line.push_str(&format!("\n    {} {:.2}", quote.symbol, quote.price));
            }
            line
        }
    }
}
