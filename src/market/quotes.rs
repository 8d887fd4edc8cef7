use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::domain::Quote;
use crate::error::Result;

/// Live quote source boundary.
///
/// `seconds_to_close` returns `None` when the clock is outside a trading
/// session or the source cannot tell; there is no numeric sentinel.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn get_quote(&self, code: &str) -> Result<Option<Quote>>;

    async fn get_quotes(&self, codes: &[String]) -> Result<Vec<Quote>> {
        let mut out = Vec::with_capacity(codes.len());
        for code in codes {
            if let Some(quote) = self.get_quote(code).await? {
                out.push(quote);
            }
        }
        Ok(out)
    }

    fn is_trading_session(&self) -> bool;

    fn seconds_to_close(&self) -> Option<i64>;
}

/// In-memory quote table. Used by tests and demo runs; quotes are keyed by
/// code and replaced wholesale on update.
pub struct StaticQuoteSource {
    quotes: DashMap<String, Quote>,
    seconds_to_close: RwLock<Option<i64>>,
}

impl StaticQuoteSource {
    pub fn new() -> Self {
        Self {
            quotes: DashMap::new(),
            seconds_to_close: RwLock::new(None),
        }
    }

    pub fn with_quotes(quotes: impl IntoIterator<Item = Quote>) -> Self {
        let source = Self::new();
        for quote in quotes {
            source.upsert(quote);
        }
        source
    }

    /// Load a quote table from a JSON array file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let quotes: Vec<Quote> = serde_json::from_str(&raw)?;
        Ok(Self::with_quotes(quotes))
    }

    pub fn upsert(&self, quote: Quote) {
        self.quotes.insert(quote.code.clone(), quote);
    }

    pub fn set_seconds_to_close(&self, secs: Option<i64>) {
        if let Ok(mut guard) = self.seconds_to_close.write() {
            *guard = secs;
        }
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

impl Default for StaticQuoteSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteSource for StaticQuoteSource {
    async fn get_quote(&self, code: &str) -> Result<Option<Quote>> {
        Ok(self.quotes.get(code).map(|entry| entry.value().clone()))
    }

    fn is_trading_session(&self) -> bool {
        self.seconds_to_close().is_some()
    }

    fn seconds_to_close(&self) -> Option<i64> {
        self.seconds_to_close.read().ok().and_then(|guard| *guard)
    }
}
