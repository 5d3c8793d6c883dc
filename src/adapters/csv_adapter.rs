//! CSV file adapters: a quote snapshot and trade journal import.
//!
//! Quotes: header `symbol,price`. Journal: header
//! `symbol,side,quantity,price,filled_at` with RFC 3339 timestamps.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::adapters::static_quotes::StaticQuotes;
use crate::domain::error::FolioError;
use crate::domain::order::Side;
use crate::domain::trade::Trade;
use crate::ports::quote_port::{Quote, QuotePort};

/// Quotes read once from a CSV snapshot.
pub struct CsvQuoteAdapter {
    path: PathBuf,
    prices: StaticQuotes,
}

impl CsvQuoteAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FolioError> {
        let path = path.as_ref().to_path_buf();
        let content = read(&path)?;
        let prices = parse_quotes(&content)?;
        Ok(Self { path, prices })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl QuotePort for CsvQuoteAdapter {
    fn quote(&self, symbol: &str) -> Result<Quote, FolioError> {
        self.prices.quote(symbol)
    }
}

fn read(path: &Path) -> Result<String, FolioError> {
    fs::read_to_string(path).map_err(|e| {
        FolioError::storage(format!("failed to read {}: {}", path.display(), e))
    })
}

fn csv_error(line: usize, reason: impl std::fmt::Display) -> FolioError {
    FolioError::storage(format!("CSV line {line}: {reason}"))
}

fn field<'r>(record: &'r csv::StringRecord, index: usize, name: &str, line: usize) -> Result<&'r str, FolioError> {
    record
        .get(index)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| csv_error(line, format!("missing {name} column")))
}

fn positive_price(raw: &str, line: usize) -> Result<f64, FolioError> {
    let price: f64 = raw
        .parse()
        .map_err(|e| csv_error(line, format!("invalid price '{raw}': {e}")))?;
    if !price.is_finite() || price <= 0.0 {
        return Err(csv_error(line, format!("price must be positive, got {raw}")));
    }
    Ok(price)
}

pub fn parse_quotes(content: &str) -> Result<StaticQuotes, FolioError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let quotes = StaticQuotes::new();

    for (i, result) in rdr.records().enumerate() {
        let line = i + 2;
        let record = result.map_err(|e| csv_error(line, e))?;
        let symbol = field(&record, 0, "symbol", line)?;
        let price = positive_price(field(&record, 1, "price", line)?, line)?;
        quotes.set(symbol, price);
    }

    Ok(quotes)
}

/// Read a trade journal file into FILLED trades with manual prices.
pub fn read_journal<P: AsRef<Path>>(path: P) -> Result<Vec<Trade>, FolioError> {
    parse_journal(&read(path.as_ref())?)
}

pub fn parse_journal(content: &str) -> Result<Vec<Trade>, FolioError> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut trades = Vec::new();

    for (i, result) in rdr.records().enumerate() {
        let line = i + 2;
        let record = result.map_err(|e| csv_error(line, e))?;

        let symbol = field(&record, 0, "symbol", line)?;
        let side_raw = field(&record, 1, "side", line)?;
        let side = Side::parse(side_raw)
            .ok_or_else(|| csv_error(line, format!("side must be BUY or SELL, got '{side_raw}'")))?;

        let qty_raw = field(&record, 2, "quantity", line)?;
        let quantity: i64 = qty_raw
            .parse()
            .map_err(|e| csv_error(line, format!("invalid quantity '{qty_raw}': {e}")))?;
        if quantity < 1 {
            return Err(csv_error(line, format!("quantity must be at least 1, got {quantity}")));
        }

        let price = positive_price(field(&record, 3, "price", line)?, line)?;

        let at_raw = field(&record, 4, "filled_at", line)?;
        let filled_at = DateTime::parse_from_rfc3339(at_raw)
            .map_err(|e| csv_error(line, format!("invalid filled_at '{at_raw}': {e}")))?
            .with_timezone(&Utc);

        trades.push(Trade::manual(symbol, side, quantity, price, filled_at));
    }

    Ok(trades)
}
