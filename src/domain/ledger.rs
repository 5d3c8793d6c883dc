//! Position ledger: applies fills to per-symbol positions.
//!
//! [`PositionBook`] is the single-owner form used for replays. [`Ledger`] is the
//! shared live form; each symbol's entry is locked for the whole
//! read-modify-write so concurrent fills on one symbol cannot corrupt the
//! blended cost, while different symbols update independently.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use super::error::FolioError;
use super::order::Side;
use super::position::{Position, SellOutcome};
use super::trade::{FillPrice, Trade, TradeStatus};

/// What to do with a sell larger than the held quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversellPolicy {
    /// Sell what is held and ignore the excess.
    #[default]
    Clamp,
    /// Refuse the whole sell.
    Reject,
}

impl OversellPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "clamp" => Some(OversellPolicy::Clamp),
            "reject" => Some(OversellPolicy::Reject),
            _ => None,
        }
    }
}

impl fmt::Display for OversellPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OversellPolicy::Clamp => write!(f, "clamp"),
            OversellPolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Result of applying one fill to a symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillEffect {
    Bought { quantity: i64, average_cost: f64 },
    Sold(SellOutcome),
}

impl FillEffect {
    pub fn realized_pnl(&self) -> Option<f64> {
        match self {
            FillEffect::Bought { .. } => None,
            FillEffect::Sold(outcome) => outcome.realized_pnl,
        }
    }
}

fn buy_transition(symbol: &str, current: Option<&Position>, quantity: i64, price: f64) -> Position {
    match current {
        Some(pos) => {
            let mut pos = pos.clone();
            pos.buy(quantity, price);
            pos
        }
        None => Position::open(symbol, quantity, price),
    }
}

fn sell_transition(
    symbol: &str,
    current: Option<&Position>,
    quantity: i64,
    price: f64,
    policy: OversellPolicy,
) -> Result<(Option<Position>, SellOutcome), FolioError> {
    let held = current.map(|p| p.quantity).unwrap_or(0);
    if policy == OversellPolicy::Reject && quantity > held {
        return Err(FolioError::risk_rejected(format!(
            "cannot sell {quantity} {symbol}: only {held} held"
        )));
    }
    match current {
        Some(pos) => {
            let mut pos = pos.clone();
            let outcome = pos.sell(quantity, price);
            let next = if pos.is_flat() { None } else { Some(pos) };
            Ok((next, outcome))
        }
        None => Ok((
            None,
            SellOutcome {
                requested: quantity,
                sold: 0,
                realized_pnl: None,
                remaining: 0,
            },
        )),
    }
}

/// Compute the next state of one symbol's position. Pure: the caller decides
/// whether to commit the returned state. `None` means the symbol is flat.
pub fn transition(
    symbol: &str,
    current: Option<&Position>,
    side: Side,
    quantity: i64,
    price: f64,
    policy: OversellPolicy,
) -> Result<(Option<Position>, FillEffect), FolioError> {
    match side {
        Side::Buy => {
            let next = buy_transition(symbol, current, quantity, price);
            let effect = FillEffect::Bought {
                quantity: next.quantity,
                average_cost: next.average_cost,
            };
            Ok((Some(next), effect))
        }
        Side::Sell => {
            let (next, outcome) = sell_transition(symbol, current, quantity, price, policy)?;
            Ok((next, FillEffect::Sold(outcome)))
        }
    }
}

/// Single-owner position book.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    positions: BTreeMap<String, Position>,
    policy: OversellPolicy,
}

impl PositionBook {
    pub fn new(policy: OversellPolicy) -> Self {
        PositionBook {
            positions: BTreeMap::new(),
            policy,
        }
    }

    pub fn apply_buy(&mut self, symbol: &str, quantity: i64, price: f64) -> &Position {
        let next = buy_transition(symbol, self.positions.get(symbol), quantity, price);
        self.positions.insert(symbol.to_string(), next);
        &self.positions[symbol]
    }

    pub fn apply_sell(
        &mut self,
        symbol: &str,
        quantity: i64,
        price: f64,
    ) -> Result<SellOutcome, FolioError> {
        let (next, outcome) =
            sell_transition(symbol, self.positions.get(symbol), quantity, price, self.policy)?;
        match next {
            Some(pos) => {
                self.positions.insert(symbol.to_string(), pos);
            }
            None => {
                self.positions.remove(symbol);
            }
        }
        Ok(outcome)
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Shared live ledger.
#[derive(Debug, Default)]
pub struct Ledger {
    positions: DashMap<String, Position>,
    policy: OversellPolicy,
}

impl Ledger {
    pub fn new(policy: OversellPolicy) -> Self {
        Ledger {
            positions: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> OversellPolicy {
        self.policy
    }

    /// Seed the ledger from stored positions. Flat or malformed rows are skipped.
    pub fn load(&self, positions: impl IntoIterator<Item = Position>) -> usize {
        let mut loaded = 0;
        for pos in positions {
            if pos.quantity <= 0 || !pos.average_cost.is_finite() || pos.average_cost <= 0.0 {
                continue;
            }
            self.positions.insert(pos.symbol.clone(), pos);
            loaded += 1;
        }
        loaded
    }

    /// Fill `trade` and apply it to its symbol's position as one step.
    ///
    /// The symbol's entry stays locked from the over-sell check until the
    /// position is committed. `persist` sees the filled trade and the fill's
    /// effect while the lock is held; if it fails, neither the position nor
    /// `trade` is touched.
    pub fn apply_fill(
        &self,
        trade: &mut Trade,
        price: FillPrice,
        filled_at: DateTime<Utc>,
        persist: impl FnOnce(&mut Trade, &FillEffect) -> Result<(), FolioError>,
    ) -> Result<FillEffect, FolioError> {
        let symbol = trade.symbol.clone();
        let (side, quantity) = (trade.side, trade.quantity);
        self.update(&symbol, side, quantity, price.value(), |effect| {
            let mut filled = trade.clone();
            filled.fill_completely(price, filled_at)?;
            persist(&mut filled, effect)?;
            *trade = filled;
            Ok(())
        })
    }

    /// Apply a trade that was filled elsewhere, e.g. an imported journal entry.
    /// `persist` runs under the symbol lock; its error leaves the position as it was.
    pub fn apply_recorded(
        &self,
        trade: &Trade,
        persist: impl FnOnce() -> Result<(), FolioError>,
    ) -> Result<FillEffect, FolioError> {
        let fill = match (trade.status, trade.fill) {
            (TradeStatus::Filled, Some(fill)) => fill,
            _ => {
                return Err(FolioError::invalid_order(format!(
                    "trade {} is {} and has no fill to apply",
                    trade.id, trade.status
                )));
            }
        };
        self.update(&trade.symbol, trade.side, fill.quantity, fill.price.value(), |_| {
            persist()
        })
    }

    /// Locked read-modify-write of one symbol. `before_commit` runs after the
    /// next state is known and before it is stored; its error aborts the update.
    fn update(
        &self,
        symbol: &str,
        side: Side,
        quantity: i64,
        price: f64,
        before_commit: impl FnOnce(&FillEffect) -> Result<(), FolioError>,
    ) -> Result<FillEffect, FolioError> {
        let entry = self.positions.entry(symbol.to_string());
        let current = match &entry {
            Entry::Occupied(occupied) => Some(occupied.get().clone()),
            Entry::Vacant(_) => None,
        };

        let (next, effect) =
            transition(symbol, current.as_ref(), side, quantity, price, self.policy)?;

        before_commit(&effect)?;

        match (entry, next) {
            (Entry::Occupied(mut occupied), Some(pos)) => {
                *occupied.get_mut() = pos;
            }
            (Entry::Occupied(occupied), None) => {
                occupied.remove();
            }
            (Entry::Vacant(vacant), Some(pos)) => {
                vacant.insert(pos);
            }
            (Entry::Vacant(_), None) => {}
        }

        debug!("Applied {} {} {} @ {:.4}: {:?}", side, quantity, symbol, price, effect);
        Ok(effect)
    }

    /// Refresh the mark of a held symbol. Quantity and cost are untouched.
    pub fn mark(&self, symbol: &str, price: f64) -> bool {
        match self.positions.get_mut(symbol) {
            Some(mut pos) => {
                pos.mark(price);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, symbol: &str) -> Option<Position> {
        self.positions.get(symbol).map(|p| p.clone())
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.positions.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Snapshot of every open position, sorted by symbol.
    pub fn positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.iter().map(|e| e.value().clone()).collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }
}
