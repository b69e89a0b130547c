//! Price record and synthetic price evolution.
//!
//! A `PriceRecord` is the value the price store keeps per symbol: the current price and
//! the UTC instant it was last written. This module also provides the helpers used when
//! no external quote is consulted: a bounded random-walk step and a random seed price.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use stock_common::{Quote, Symbol};

/// Largest absolute change of one synthetic tick, in cents (2.50).
pub const MAX_TICK_CENTS: i64 = 250;

/// Lowest synthetic seed price, in cents (10.00).
const MIN_SEED_CENTS: i64 = 1_000;

/// Highest synthetic seed price, in cents (500.00).
const MAX_SEED_CENTS: i64 = 50_000;

/// Current price of one tracked symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Last price; never negative.
    pub price: Decimal,
    /// When `price` was last written.
    pub last_updated: DateTime<Utc>,
}

impl PriceRecord {
    /// Create a record stamped with the current time. Negative input is floored at zero.
    pub fn new(symbol: Symbol, price: Decimal) -> Self {
        PriceRecord {
            symbol,
            price: price.max(Decimal::ZERO),
            last_updated: Utc::now(),
        }
    }

    /// Overwrite the price and timestamp together.
    pub fn set_price(&mut self, price: Decimal) {
        self.price = price.max(Decimal::ZERO);
        self.last_updated = Utc::now();
    }

    /// Apply one synthetic tick and return the new price.
    pub fn tick(&mut self) -> Decimal {
        let next = next_price(self.price);
        self.set_price(next);
        self.price
    }

    /// `{symbol, price}` view sent to clients.
    pub fn quote(&self) -> Quote {
        Quote::new(self.symbol.clone(), self.price)
    }
}

/// Calculate the next synthetic price from `current_price`.
///
/// The change is sampled uniformly from `[-2.50, +2.50]` with cent resolution and the
/// result is floored at zero.
pub fn next_price(current_price: Decimal) -> Decimal {
    let mut rng = rand::rng();
    let change = Decimal::new(rng.random_range(-MAX_TICK_CENTS..=MAX_TICK_CENTS), 2);
    (current_price + change).max(Decimal::ZERO)
}

/// Random starting price for a symbol with no external quote.
pub fn seed_price() -> Decimal {
    let mut rng = rand::rng();
    Decimal::new(rng.random_range(MIN_SEED_CENTS..MAX_SEED_CENTS), 2)
}
