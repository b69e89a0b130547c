//! External quote provider adapter.
//!
//! [`PriceSource`] is the seam the price store uses to seed and refresh symbols from a
//! third-party API. [`HttpPriceSource`] calls a Twelve Data style endpoint
//! (`GET {base}/price?symbol=SYM&apikey=KEY`, query values percent-encoded, answering `{"price":"123.45"}`) with a
//! blocking HTTP client. [`CachedPriceSource`] sits in front of any source and reuses a
//! fetched price while it is younger than the freshness window.
//!
//! Every failure (transport, HTTP status, body, price field) is reported as
//! `StockError::ExternalFetch`; callers are expected to fall back to a synthetic price.

use dashmap::DashMap;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::Value;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stock_common::{StockError, Symbol};

/// Default freshness window of cached external prices.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Something that can produce a current price for a symbol.
pub trait PriceSource: Send + Sync {
    /// Fetch the price of `symbol`. Returned prices are always positive.
    fn fetch(&self, symbol: &Symbol) -> Result<Decimal, StockError>;
}

impl<S: PriceSource + ?Sized> PriceSource for Arc<S> {
    fn fetch(&self, symbol: &Symbol) -> Result<Decimal, StockError> {
        (**self).fetch(symbol)
    }
}

/// Provider credential. Its `Debug` output never shows the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// The raw key, for building requests only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl From<&str> for ApiKey {
    fn from(raw: &str) -> Self {
        ApiKey(raw.to_string())
    }
}

impl FromStr for ApiKey {
    type Err = Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(ApiKey::from(raw))
    }
}

/// Quote provider reached over HTTP.
pub struct HttpPriceSource {
    base_url: String,
    api_key: Option<ApiKey>,
    agent: ureq::Agent,
}

impl HttpPriceSource {
    /// Build a source for `base_url` (without trailing `/price`).
    pub fn new(base_url: &str, api_key: Option<ApiKey>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        HttpPriceSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            agent,
        }
    }
}

impl PriceSource for HttpPriceSource {
    fn fetch(&self, symbol: &Symbol) -> Result<Decimal, StockError> {
        debug!("Fetching external price for {}", symbol);
        let mut request = self
            .agent
            .get(&format!("{}/price", self.base_url))
            .query("symbol", symbol.as_str())
            .set("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.query("apikey", key.expose());
        }

        // ureq errors carry the full URL, query string included.
        let response = request.call().map_err(|e| {
            let reason = match e {
                ureq::Error::Status(code, _) => format!("HTTP status {}", code),
                ureq::Error::Transport(transport) => format!("request failed: {}", transport.kind()),
            };
            StockError::ExternalFetch(format!("{}: {}", symbol, reason))
        })?;

        let body = response
            .into_string()
            .map_err(|e| StockError::ExternalFetch(format!("{}: unreadable body: {}", symbol, e)))?;

        let price = parse_price_body(&body)
            .map_err(|e| StockError::ExternalFetch(format!("{}: {}", symbol, e)))?;
        info!("Fetched real-time price for {}: {}", symbol, price);
        Ok(price)
    }
}

/// Extract a positive `price` field from a provider response body.
///
/// The field may be a JSON string (`"123.45"`) or a number.
pub fn parse_price_body(body: &str) -> Result<Decimal, String> {
    let doc: Value = serde_json::from_str(body).map_err(|e| format!("malformed body: {}", e))?;
    let field = doc
        .get("price")
        .ok_or_else(|| format!("missing price field in {}", body))?;

    let price = match field {
        Value::String(raw) => Decimal::from_str(raw.trim())
            .map_err(|e| format!("unparsable price {:?}: {}", raw, e))?,
        Value::Number(number) => number
            .as_f64()
            .and_then(Decimal::from_f64)
            .ok_or_else(|| format!("unparsable price {}", number))?,
        other => return Err(format!("unexpected price value {}", other)),
    };

    if price <= Decimal::ZERO {
        return Err(format!("non-positive price {}", price));
    }
    Ok(price)
}

/// Last successful fetch of one symbol.
#[derive(Debug, Clone, Copy)]
pub struct CacheEntry {
    /// Fetched price.
    pub price: Decimal,
    /// When the price was fetched.
    pub fetched_at: Instant,
}

/// Freshness-window cache in front of another source.
pub struct CachedPriceSource<S> {
    inner: S,
    ttl: Duration,
    entries: DashMap<Symbol, CacheEntry>,
}

impl<S: PriceSource> CachedPriceSource<S> {
    /// Wrap `inner`, reusing prices younger than `ttl`.
    pub fn new(inner: S, ttl: Duration) -> Self {
        CachedPriceSource {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Cached entry for `symbol`, fresh or not.
    pub fn cached(&self, symbol: &Symbol) -> Option<CacheEntry> {
        self.entries.get(symbol).map(|entry| *entry)
    }
}

impl<S: PriceSource> PriceSource for CachedPriceSource<S> {
    fn fetch(&self, symbol: &Symbol) -> Result<Decimal, StockError> {
        if let Some(entry) = self.cached(symbol) {
            if entry.fetched_at.elapsed() < self.ttl {
                debug!("Returning cached price for {}: {}", symbol, entry.price);
                return Ok(entry.price);
            }
        }

        match self.inner.fetch(symbol) {
            Ok(price) => {
                self.entries.insert(
                    symbol.clone(),
                    CacheEntry {
                        price,
                        fetched_at: Instant::now(),
                    },
                );
                Ok(price)
            }
            Err(e) => {
                warn!("External price unavailable for {}: {}", symbol, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crossbeam_channel::{Receiver, unbounded};
    use rust_decimal_macros::dec;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// Scripted source that counts calls.
    pub(crate) struct FakeSource {
        pub(crate) answers: Mutex<Vec<Result<Decimal, String>>>,
        pub(crate) calls: AtomicUsize,
    }

    impl FakeSource {
        pub(crate) fn always(price: Decimal) -> Self {
            FakeSource {
                answers: Mutex::new(vec![Ok(price)]),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            FakeSource {
                answers: Mutex::new(vec![Err("provider down".to_string())]),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl PriceSource for FakeSource {
        fn fetch(&self, _symbol: &Symbol) -> Result<Decimal, StockError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut answers = self.answers.lock().unwrap();
            let answer = if answers.len() > 1 {
                answers.remove(0)
            } else {
                answers[0].clone()
            };
            answer.map_err(StockError::ExternalFetch)
        }
    }

    /// Serve one canned HTTP response on a loopback port.
    ///
    /// Returns the base URL and a channel yielding the request line that was received.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (request_tx, request_rx) = unbounded();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                let mut first = true;
                while reader.read_line(&mut line).unwrap_or(0) > 0 {
                    if line == "\r\n" {
                        break;
                    }
                    if first {
                        let _ = request_tx.send(line.trim_end().to_string());
                        first = false;
                    }
                    line.clear();
                }
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (format!("http://{}", addr), request_rx)
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_price_body_variants() {
        assert_eq!(parse_price_body(r#"{"price":"187.32000"}"#).unwrap(), dec!(187.32));
        assert_eq!(parse_price_body(r#"{"price":42.5}"#).unwrap(), dec!(42.5));
        assert!(parse_price_body(r#"{"code":400,"message":"bad symbol"}"#).is_err());
        assert!(parse_price_body(r#"{"price":"n/a"}"#).is_err());
        assert!(parse_price_body(r#"{"price":"0"}"#).is_err());
        assert!(parse_price_body("<html>").is_err());
    }

    #[test]
    fn test_http_source_reads_price() {
        let (base, requests) = serve_once("200 OK", r#"{"price":"712.10"}"#);
        let source = HttpPriceSource::new(&base, Some("key".into()), Duration::from_secs(5));
        assert_eq!(source.fetch(&symbol("TSLA")).unwrap(), dec!(712.10));
        assert_eq!(
            requests.recv().unwrap(),
            "GET /price?symbol=TSLA&apikey=key HTTP/1.1"
        );
    }

    #[test]
    fn test_http_source_encodes_symbol() {
        let (base, requests) = serve_once("200 OK", r#"{"price":"5100.25"}"#);
        let source = HttpPriceSource::new(&base, None, Duration::from_secs(5));
        assert_eq!(source.fetch(&symbol("^GSPC")).unwrap(), dec!(5100.25));

        let request_line = requests.recv().unwrap();
        assert!(request_line.contains("symbol=%5EGSPC"), "{}", request_line);
        assert!(!request_line.contains("apikey"));
    }

    #[test]
    fn test_http_source_reports_status_failure() {
        let (base, _requests) = serve_once("500 Internal Server Error", r#"{"message":"boom"}"#);
        let source = HttpPriceSource::new(&base, Some("S3CRET-KEY".into()), Duration::from_secs(5));
        let err = source.fetch(&symbol("TSLA")).unwrap_err();
        assert!(matches!(err, StockError::ExternalFetch(_)));
        assert!(err.to_string().contains("500"));
        assert!(!err.to_string().contains("S3CRET-KEY"));
    }

    #[test]
    fn test_http_source_reports_connection_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let source = HttpPriceSource::new(&base, Some("S3CRET-KEY".into()), Duration::from_secs(2));
        let err = source.fetch(&symbol("IBM")).unwrap_err();
        assert!(matches!(err, StockError::ExternalFetch(_)));
        assert!(!err.to_string().contains("S3CRET-KEY"));
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key: ApiKey = "S3CRET-KEY".parse().unwrap();
        assert_eq!(key.expose(), "S3CRET-KEY");
        assert!(!format!("{:?}", Some(key)).contains("S3CRET-KEY"));
    }

    #[test]
    fn test_cache_reuses_fresh_price() {
        let inner = Arc::new(FakeSource::always(dec!(99.5)));
        let cached = CachedPriceSource::new(inner.clone(), Duration::from_secs(300));
        let aapl = symbol("AAPL");

        assert_eq!(cached.fetch(&aapl).unwrap(), dec!(99.5));
        assert_eq!(cached.fetch(&aapl).unwrap(), dec!(99.5));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.cached(&aapl).unwrap().price, dec!(99.5));
    }

    #[test]
    fn test_cache_refetches_after_window() {
        let inner = Arc::new(FakeSource::always(dec!(10)));
        let cached = CachedPriceSource::new(inner.clone(), Duration::ZERO);
        let aapl = symbol("AAPL");

        cached.fetch(&aapl).unwrap();
        cached.fetch(&aapl).unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_does_not_store_failures() {
        let inner = Arc::new(FakeSource::failing());
        let cached = CachedPriceSource::new(inner.clone(), Duration::from_secs(300));
        let aapl = symbol("AAPL");

        assert!(cached.fetch(&aapl).is_err());
        assert!(cached.cached(&aapl).is_none());
        assert!(cached.fetch(&aapl).is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
