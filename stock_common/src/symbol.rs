//! Stock symbols and helpers shared between client and server.
//!
//! A [`Symbol`] is always normalized: surrounding whitespace is trimmed and letters are
//! upper-cased before the value can be constructed, so `" aapl"` and `"AAPL"` name the
//! same stock everywhere in the system.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use crate::error::StockError;

/// Longest accepted symbol, after trimming.
pub const MAX_SYMBOL_LEN: usize = 16;

/// Normalized (upper-case) ticker identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Normalize and validate `raw`.
    ///
    /// Accepts ASCII letters, digits and the punctuation used by exchange suffixes and
    /// index tickers (`.`, `-`, `^`, `=`).
    pub fn parse(raw: &str) -> Result<Self, StockError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(StockError::InvalidArgument("empty symbol".to_string()));
        }
        if trimmed.len() > MAX_SYMBOL_LEN {
            return Err(StockError::InvalidArgument(format!(
                "symbol longer than {} characters: {}",
                MAX_SYMBOL_LEN, trimmed
            )));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=')))
        {
            return Err(StockError::InvalidArgument(format!(
                "invalid character {:?} in symbol {}",
                bad, trimmed
            )));
        }
        Ok(Symbol(trimmed.to_ascii_uppercase()))
    }

    /// The normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Symbol {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = StockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait providing file parsing for symbols.
pub trait SymbolParser {
    /// Parses symbols from a buffered reader.
    ///
    /// Symbols may be separated by commas, whitespace or new lines; everything after
    /// a `#` on a line is a comment. Duplicates are dropped, first occurrence wins.
    /// Returns an error if any entry is not a valid symbol.
    fn parse_from_file<R: BufRead>(reader: R) -> Result<Vec<Symbol>, StockError>;
}

impl SymbolParser for Symbol {
    fn parse_from_file<R: BufRead>(reader: R) -> Result<Vec<Self>, StockError> {
        let mut symbols: Vec<Symbol> = Vec::new();

        for line_result in reader.lines() {
            let line = line_result.map_err(StockError::Io)?;
            let content = line.split('#').next().unwrap_or_default();

            for token in content.split(|c: char| c == ',' || c.is_whitespace()) {
                if token.is_empty() {
                    continue;
                }
                match token.parse::<Self>() {
                    Ok(symbol) => {
                        if !symbols.contains(&symbol) {
                            symbols.push(symbol);
                        }
                    }
                    Err(e) => return Err(StockError::ParseSymbolsFile(e.to_string())),
                }
            }
        }
        Ok(symbols)
    }
}

/// Parse a comma separated list given on a command line.
pub fn parse_symbol_list(raw: &str) -> Result<Vec<Symbol>, StockError> {
    Symbol::parse_from_file(raw.as_bytes())
}
