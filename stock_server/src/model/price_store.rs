//! Concurrent registry of tracked symbols and their last prices.
//!
//! Records live in a sharded `DashMap`, so operations on different symbols rarely
//! contend and every mutation of one symbol (price and timestamp together) happens under
//! that symbol's shard lock. External fetches are always performed before the lock is
//! taken; only the commit runs inside it.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;
use stock_common::{Quote, StockError, Symbol};

use crate::model::price_record::{PriceRecord, seed_price};
use crate::model::price_source::PriceSource;

/// Symbol → price registry.
pub struct PriceStore {
    records: DashMap<Symbol, PriceRecord>,
    source: Option<Arc<dyn PriceSource>>,
}

impl PriceStore {
    /// Store that seeds and evolves prices synthetically.
    pub fn new() -> Self {
        PriceStore {
            records: DashMap::new(),
            source: None,
        }
    }

    /// Store that seeds new symbols (and refreshes, see [`Self::refresh`]) from `source`.
    pub fn with_source(source: Arc<dyn PriceSource>) -> Self {
        PriceStore {
            records: DashMap::new(),
            source: Some(source),
        }
    }

    /// Snapshot of the record for `symbol`, `None` when it is not tracked.
    pub fn get(&self, symbol: &Symbol) -> Option<PriceRecord> {
        self.records.get(symbol).map(|record| record.clone())
    }

    /// `true` when `symbol` is tracked.
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.records.contains_key(symbol)
    }

    /// Start tracking `symbol`. Returns `false` if it already exists.
    ///
    /// The initial price comes from the external source when one is configured; a
    /// failed fetch (or no source) falls back to a synthetic seed.
    pub fn add(&self, symbol: &Symbol) -> bool {
        if self.contains(symbol) {
            return false;
        }

        let price = self.initial_price(symbol);
        match self.records.entry(symbol.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(PriceRecord::new(symbol.clone(), price));
                info!("Added stock {} at {}", symbol, price);
                true
            }
        }
    }

    fn initial_price(&self, symbol: &Symbol) -> Decimal {
        match &self.source {
            Some(source) => match source.fetch(symbol) {
                Ok(price) => price,
                Err(e) => {
                    warn!("Seeding {} synthetically: {}", symbol, e);
                    seed_price()
                }
            },
            None => seed_price(),
        }
    }

    /// Stop tracking `symbol`. Returns `false` if it was unknown.
    pub fn remove(&self, symbol: &Symbol) -> bool {
        let removed = self.records.remove(symbol).is_some();
        if removed {
            info!("Removed stock {}", symbol);
        }
        removed
    }

    /// Overwrite the price of a tracked symbol.
    ///
    /// Non-positive prices are rejected before anything is touched. Returns `Ok(false)`
    /// for an unknown symbol.
    pub fn update(&self, symbol: &Symbol, price: Decimal) -> Result<bool, StockError> {
        if price <= Decimal::ZERO {
            return Err(StockError::InvalidArgument(format!(
                "price must be positive, got {}",
                price
            )));
        }
        match self.records.get_mut(symbol) {
            Some(mut record) => {
                record.set_price(price);
                debug!("Updated stock {} to {}", symbol, price);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Apply one synthetic random-walk step. `None` if `symbol` is unknown.
    pub fn tick(&self, symbol: &Symbol) -> Option<Decimal> {
        self.records.get_mut(symbol).map(|mut record| record.tick())
    }

    /// Re-fetch the price from the external source and commit it.
    ///
    /// Without a source, or when the fetch fails, this is a synthetic [`Self::tick`].
    /// `None` if `symbol` is unknown (including removed while the fetch was in flight).
    pub fn refresh(&self, symbol: &Symbol) -> Option<Decimal> {
        let Some(source) = &self.source else {
            return self.tick(symbol);
        };
        if !self.contains(symbol) {
            return None;
        }

        match source.fetch(symbol) {
            Ok(price) => self.records.get_mut(symbol).map(|mut record| {
                record.set_price(price);
                record.price
            }),
            Err(e) => {
                debug!("Refresh of {} falls back to synthetic tick: {}", symbol, e);
                self.tick(symbol)
            }
        }
    }

    /// Sorted copy of the tracked symbols.
    pub fn list_symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.records.iter().map(|r| r.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Sorted copy of every `{symbol, price}` pair.
    pub fn quotes(&self) -> Vec<Quote> {
        let mut quotes: Vec<Quote> = self.records.iter().map(|r| r.value().quote()).collect();
        quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        quotes
    }

    /// Number of tracked symbols.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for PriceStore {
    fn default() -> Self {
        Self::new()
    }
}
