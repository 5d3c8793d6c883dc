//! Fixed price table, mutable at runtime. Used by tests and the CSV adapter.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::error::FolioError;
use crate::ports::quote_port::{Quote, QuotePort};

#[derive(Default)]
pub struct StaticQuotes {
    prices: RwLock<HashMap<String, f64>>,
}

impl StaticQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(self, symbol: &str, price: f64) -> Self {
        self.set(symbol, price);
        self
    }

    pub fn set(&self, symbol: &str, price: f64) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(symbol.trim().to_uppercase(), price);
        }
    }

    /// Make `symbol` unavailable, as if the price source were down for it.
    pub fn remove(&self, symbol: &str) {
        if let Ok(mut prices) = self.prices.write() {
            prices.remove(&symbol.trim().to_uppercase());
        }
    }

    pub fn len(&self) -> usize {
        self.prices.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QuotePort for StaticQuotes {
    fn quote(&self, symbol: &str) -> Result<Quote, FolioError> {
        let key = symbol.trim().to_uppercase();
        let prices = self.prices.read().map_err(|_| FolioError::UpstreamUnavailable {
            symbol: key.clone(),
            reason: "price table lock poisoned".to_string(),
        })?;
        match prices.get(&key) {
            Some(&price) => Ok(Quote { symbol: key, price }),
            None => Err(FolioError::UpstreamUnavailable {
                symbol: key,
                reason: "no price available".to_string(),
            }),
        }
    }
}
