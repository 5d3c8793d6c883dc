#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use folio::adapters::memory_store::MemoryStore;
use folio::domain::broker::Broker;
use folio::domain::config_validation::Settings;
use folio::domain::error::FolioError;
use folio::domain::hypothesis::Hypothesis;
use folio::domain::order::{OrderRequest, Side};
use folio::domain::position::Position;
use folio::domain::trade::Trade;
use folio::ports::quote_port::{Quote, QuotePort};
use folio::ports::store_port::StorePort;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Quote source with per-symbol prices and per-symbol failures.
#[derive(Default)]
pub struct MockQuotePort {
    prices: RwLock<HashMap<String, f64>>,
    errors: RwLock<HashMap<String, String>>,
}

impl MockQuotePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, symbol: &str, price: f64) -> Self {
        self.set_price(symbol, price);
        self
    }

    pub fn with_error(self, symbol: &str, reason: &str) -> Self {
        self.errors
            .write()
            .unwrap()
            .insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.errors.write().unwrap().remove(symbol);
        self.prices.write().unwrap().insert(symbol.to_string(), price);
    }

    pub fn fail(&self, symbol: &str) {
        self.errors
            .write()
            .unwrap()
            .insert(symbol.to_string(), "connection reset".to_string());
    }
}

impl QuotePort for MockQuotePort {
    fn quote(&self, symbol: &str) -> Result<Quote, FolioError> {
        if let Some(reason) = self.errors.read().unwrap().get(symbol) {
            return Err(FolioError::UpstreamUnavailable {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        match self.prices.read().unwrap().get(symbol) {
            Some(&price) => Ok(Quote {
                symbol: symbol.to_string(),
                price,
            }),
            None => Err(FolioError::UpstreamUnavailable {
                symbol: symbol.to_string(),
                reason: "unknown symbol".to_string(),
            }),
        }
    }
}

/// Memory store with injectable faults: position writes can be switched off,
/// the next trade writes can fail, and the next single-trade read can be
/// served from a stale snapshot.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub positions_down: AtomicBool,
    trade_write_failures: AtomicUsize,
    stale: RwLock<Option<Vec<Trade>>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn break_positions(&self, down: bool) {
        self.positions_down.store(down, Ordering::SeqCst);
    }

    /// Fail the next `count` trade writes.
    pub fn fail_trade_writes(&self, count: usize) {
        self.trade_write_failures.store(count, Ordering::SeqCst);
    }

    /// Serve the next `get_trade` from the trades as they are now.
    pub fn stale_next_trade_read(&self) {
        *self.stale.write().unwrap() = Some(self.inner.list_trades().unwrap());
    }

    fn check_trade_write(&self) -> Result<(), FolioError> {
        let failing = self
            .trade_write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(FolioError::storage("disk full"))
        } else {
            Ok(())
        }
    }

    fn check(&self) -> Result<(), FolioError> {
        if self.positions_down.load(Ordering::SeqCst) {
            Err(FolioError::storage("disk I/O error"))
        } else {
            Ok(())
        }
    }
}

impl StorePort for FlakyStore {
    fn save_trade(&self, trade: &Trade) -> Result<(), FolioError> {
        self.check_trade_write()?;
        self.inner.save_trade(trade)
    }
    fn update_trade(&self, trade: &Trade) -> Result<(), FolioError> {
        self.check_trade_write()?;
        self.inner.update_trade(trade)
    }
    fn update_open_trade(&self, trade: &Trade) -> Result<bool, FolioError> {
        self.check_trade_write()?;
        self.inner.update_open_trade(trade)
    }
    fn get_trade(&self, id: &str) -> Result<Option<Trade>, FolioError> {
        if let Some(snapshot) = self.stale.write().unwrap().take() {
            return Ok(snapshot.iter().find(|t| t.id == id).cloned());
        }
        self.inner.get_trade(id)
    }
    fn list_trades(&self) -> Result<Vec<Trade>, FolioError> {
        self.inner.list_trades()
    }
    fn save_position(&self, position: &Position) -> Result<(), FolioError> {
        self.check()?;
        self.inner.save_position(position)
    }
    fn delete_position(&self, symbol: &str) -> Result<(), FolioError> {
        self.check()?;
        self.inner.delete_position(symbol)
    }
    fn list_positions(&self) -> Result<Vec<Position>, FolioError> {
        self.inner.list_positions()
    }
    fn save_hypothesis(&self, hypothesis: &Hypothesis) -> Result<(), FolioError> {
        self.inner.save_hypothesis(hypothesis)
    }
    fn update_hypothesis(&self, hypothesis: &Hypothesis) -> Result<(), FolioError> {
        self.inner.update_hypothesis(hypothesis)
    }
    fn get_hypothesis(&self, id: &str) -> Result<Option<Hypothesis>, FolioError> {
        self.inner.get_hypothesis(id)
    }
    fn list_hypotheses(&self) -> Result<Vec<Hypothesis>, FolioError> {
        self.inner.list_hypotheses()
    }
}

pub fn market(symbol: &str, side: &str, quantity: f64) -> OrderRequest {
    OrderRequest {
        symbol: symbol.to_string(),
        side: side.to_string(),
        quantity: Some(quantity),
        order_type: "MARKET".to_string(),
        limit_price: None,
        time_in_force: None,
    }
}

pub fn limit(symbol: &str, side: &str, quantity: f64, limit_price: f64) -> OrderRequest {
    OrderRequest {
        order_type: "LIMIT".to_string(),
        limit_price: Some(limit_price),
        ..market(symbol, side, quantity)
    }
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

pub fn filled(symbol: &str, side: Side, quantity: i64, price: f64, when: DateTime<Utc>) -> Trade {
    Trade::manual(symbol, side, quantity, price, when)
}

pub fn flaky_broker(quotes: Arc<MockQuotePort>) -> (Broker, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::new());
    let broker = Broker::new(quotes, store.clone(), Settings::default()).unwrap();
    (broker, store)
}

pub fn broker(quotes: Arc<MockQuotePort>) -> (Broker, Arc<MemoryStore>) {
    broker_with(quotes, Settings::default())
}

pub fn broker_with(quotes: Arc<MockQuotePort>, settings: Settings) -> (Broker, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let broker = Broker::new(quotes, store.clone(), settings).unwrap();
    (broker, store)
}
