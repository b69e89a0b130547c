//! Bidirectional symbol ↔ connection index.
//!
//! Two adjacency maps describe the same many-to-many relation:
//!
//! - `groups`: symbol → connections subscribed to it,
//! - `subscriptions`: connection → symbols it is subscribed to.
//!
//! Every method updates both maps before returning, so the invariant
//! "`c` is in `groups[s]` iff `s` is in `subscriptions[c]`" holds between calls. The index
//! itself is not synchronized; the router keeps it behind a single lock so each method
//! call is one transaction.
//!
//! Groups are not removed when their last member leaves: a symbol with no subscribers
//! keeps an empty group until the symbol itself is dropped.

use std::collections::{HashMap, HashSet};
use stock_common::Symbol;

use crate::model::ConnectionId;

/// Many-to-many relation between connections and symbols.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    groups: HashMap<Symbol, HashSet<ConnectionId>>,
    subscriptions: HashMap<ConnectionId, HashSet<Symbol>>,
}

impl SubscriptionIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connection` known with no subscriptions. No-op if already present.
    pub fn add_connection(&mut self, connection: ConnectionId) {
        self.subscriptions.entry(connection).or_default();
    }

    /// `true` if `connection` is known.
    pub fn has_connection(&self, connection: ConnectionId) -> bool {
        self.subscriptions.contains_key(&connection)
    }

    /// Link `connection` and `symbol`. Returns `false` if they were already linked.
    ///
    /// An unknown connection is added implicitly.
    pub fn link(&mut self, connection: ConnectionId, symbol: &Symbol) -> bool {
        let inserted = self
            .subscriptions
            .entry(connection)
            .or_default()
            .insert(symbol.clone());
        self.groups
            .entry(symbol.clone())
            .or_default()
            .insert(connection);
        inserted
    }

    /// Unlink `connection` and `symbol`. Returns `false` if they were not linked.
    pub fn unlink(&mut self, connection: ConnectionId, symbol: &Symbol) -> bool {
        let removed = self
            .subscriptions
            .get_mut(&connection)
            .map(|symbols| symbols.remove(symbol))
            .unwrap_or(false);
        if let Some(members) = self.groups.get_mut(symbol) {
            members.remove(&connection);
        }
        removed
    }

    /// Forget `connection` entirely and return the symbols it was subscribed to.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> Vec<Symbol> {
        let symbols = self.subscriptions.remove(&connection).unwrap_or_default();
        for symbol in &symbols {
            if let Some(members) = self.groups.get_mut(symbol) {
                members.remove(&connection);
            }
        }
        let mut symbols: Vec<Symbol> = symbols.into_iter().collect();
        symbols.sort();
        symbols
    }

    /// Forget `symbol`'s group and return the connections that were in it.
    pub fn remove_symbol(&mut self, symbol: &Symbol) -> Vec<ConnectionId> {
        let members = self.groups.remove(symbol).unwrap_or_default();
        for connection in &members {
            if let Some(symbols) = self.subscriptions.get_mut(connection) {
                symbols.remove(symbol);
            }
        }
        let mut members: Vec<ConnectionId> = members.into_iter().collect();
        members.sort();
        members
    }

    /// Connections currently in `symbol`'s group.
    pub fn subscribers(&self, symbol: &Symbol) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .groups
            .get(symbol)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Symbols `connection` is subscribed to.
    pub fn symbols_of(&self, connection: ConnectionId) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self
            .subscriptions
            .get(&connection)
            .map(|symbols| symbols.iter().cloned().collect())
            .unwrap_or_default();
        symbols.sort();
        symbols
    }

    /// `true` if `connection` is in `symbol`'s group.
    fn is_subscribed(&self, connection: ConnectionId, symbol: &Symbol) -> bool {
        self.groups
            .get(symbol)
            .is_some_and(|members| members.contains(&connection))
    }

    /// Every known connection.
    pub fn connections(&self) -> Vec<ConnectionId> {
        let mut connections: Vec<ConnectionId> = self.subscriptions.keys().copied().collect();
        connections.sort();
        connections
    }

    /// `true` when both maps describe the same relation.
    pub fn is_consistent(&self) -> bool {
        let forward = self.subscriptions.iter().all(|(connection, symbols)| {
            symbols
                .iter()
                .all(|symbol| self.is_subscribed(*connection, symbol))
        });
        let backward = self.groups.iter().all(|(symbol, members)| {
            members.iter().all(|connection| {
                self.subscriptions
                    .get(connection)
                    .is_some_and(|symbols| symbols.contains(symbol))
            })
        });
        forward && backward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).unwrap()
    }

    #[test]
    fn test_link_is_idempotent() {
        let mut index = SubscriptionIndex::new();
        let aapl = symbol("AAPL");
        let c1 = ConnectionId(1);

        assert!(index.link(c1, &aapl));
        assert!(!index.link(c1, &aapl));
        assert_eq!(index.subscribers(&aapl), vec![c1]);
        assert_eq!(index.symbols_of(c1), vec![aapl]);
        assert!(index.is_consistent());
    }

    #[test]
    fn test_unlink_keeps_empty_group() {
        let mut index = SubscriptionIndex::new();
        let aapl = symbol("AAPL");
        let c1 = ConnectionId(1);

        index.link(c1, &aapl);
        assert!(index.unlink(c1, &aapl));
        assert!(!index.unlink(c1, &aapl));
        assert!(index.subscribers(&aapl).is_empty());
        assert!(index.has_connection(c1));
        assert!(index.is_consistent());
    }

    #[test]
    fn test_remove_connection_leaves_no_trace() {
        let mut index = SubscriptionIndex::new();
        let (aapl, msft) = (symbol("AAPL"), symbol("MSFT"));
        let (c1, c2) = (ConnectionId(1), ConnectionId(2));

        index.link(c1, &aapl);
        index.link(c1, &msft);
        index.link(c2, &aapl);

        assert_eq!(index.remove_connection(c1), vec![aapl.clone(), msft.clone()]);
        assert!(!index.has_connection(c1));
        assert_eq!(index.subscribers(&aapl), vec![c2]);
        assert!(index.subscribers(&msft).is_empty());
        assert!(index.remove_connection(c1).is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn test_remove_symbol_updates_connections() {
        let mut index = SubscriptionIndex::new();
        let (aapl, msft) = (symbol("AAPL"), symbol("MSFT"));
        let (c1, c2) = (ConnectionId(1), ConnectionId(2));

        index.link(c1, &aapl);
        index.link(c1, &msft);
        index.link(c2, &aapl);

        assert_eq!(index.remove_symbol(&aapl), vec![c1, c2]);
        assert_eq!(index.symbols_of(c1), vec![msft]);
        assert!(index.symbols_of(c2).is_empty());
        assert!(index.has_connection(c2));
        assert!(index.is_consistent());
    }

    #[test]
    fn test_many_to_many_stays_consistent() {
        let mut index = SubscriptionIndex::new();
        let symbols: Vec<Symbol> = ["A", "B", "C"].iter().map(|s| symbol(s)).collect();

        for id in 0..10u64 {
            index.add_connection(ConnectionId(id));
            for (i, s) in symbols.iter().enumerate() {
                if (id as usize + i) % 2 == 0 {
                    index.link(ConnectionId(id), s);
                }
            }
        }
        for id in (0..10u64).step_by(3) {
            index.remove_connection(ConnectionId(id));
        }
        index.unlink(ConnectionId(1), &symbols[1]);

        assert!(index.is_consistent());
        assert_eq!(index.connections().len(), 6);
    }
}
