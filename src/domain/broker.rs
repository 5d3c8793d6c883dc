//! Simulated broker: the single entry point that ties validation, risk,
//! pricing, the ledger and persistence together.
//!
//! A fill's trade record is written while its symbol is locked in the ledger,
//! and the position is committed only once that write succeeds. Trades leave
//! NEW through a conditional store update, so a cancel and a fill of the same
//! order cannot both win. Position rows are written afterwards; a failed
//! position write is logged and repaired by the next [`Broker::sync_positions`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use super::analysis::{PortfolioAnalysis, compute_analysis};
use super::config_validation::Settings;
use super::error::FolioError;
use super::execution::{
    Execution, ExecutionConfig, is_expired, pending_order, resolve_reference, simulate,
};
use super::hypothesis::{Hypothesis, HypothesisResult, Judgement, check_hypothesis};
use super::ledger::{FillEffect, Ledger};
use super::order::{OrderRequest, validate_order};
use super::position::Position;
use super::risk::RiskPolicy;
use super::sync::SyncGuard;
use super::trade::{FillPrice, Trade};
use crate::ports::quote_port::QuotePort;
use crate::ports::store_port::StorePort;

/// Result of a full position sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed {
        marked: usize,
        quote_failures: usize,
        write_failures: usize,
    },
    AlreadyRunning,
}

/// Result of a pass over the pending orders.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    Completed(PendingSweep),
    AlreadyRunning,
}

impl SweepOutcome {
    /// The sweep, or `None` when another sweep held the guard.
    pub fn completed(self) -> Option<PendingSweep> {
        match self {
            SweepOutcome::Completed(sweep) => Some(sweep),
            SweepOutcome::AlreadyRunning => None,
        }
    }
}

/// What one pass over the pending orders did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PendingSweep {
    pub filled: Vec<Trade>,
    pub expired: Vec<Trade>,
    pub rejected: Vec<Trade>,
    pub waiting: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: Vec<String>,
}

pub struct Broker {
    quotes: Arc<dyn QuotePort>,
    store: Arc<dyn StorePort>,
    risk: RiskPolicy,
    execution: ExecutionConfig,
    ledger: Ledger,
    sync: SyncGuard,
    sweep: SyncGuard,
}

impl Broker {
    /// Build a broker and seed its ledger from the stored positions.
    pub fn new(
        quotes: Arc<dyn QuotePort>,
        store: Arc<dyn StorePort>,
        settings: Settings,
    ) -> Result<Self, FolioError> {
        let ledger = Ledger::new(settings.oversell);
        let loaded = ledger.load(store.list_positions()?);
        info!("Loaded {} open positions", loaded);
        Ok(Broker {
            quotes,
            store,
            risk: settings.risk,
            execution: settings.execution,
            ledger,
            sync: SyncGuard::new(),
            sweep: SyncGuard::new(),
        })
    }

    /// Validate, risk-check, price and simulate an order.
    ///
    /// Market orders come back FILLED. Limit orders come back FILLED or, when
    /// the price is not yet acceptable, NEW and waiting for
    /// [`Broker::process_pending`]. On any error nothing is recorded and the
    /// ledger is unchanged, so the order can be retried.
    pub fn place_order(&self, request: &OrderRequest) -> Result<Trade, FolioError> {
        let order = validate_order(request)?;
        self.risk.check(&order)?;

        if self.execution.latency_ms > 0 {
            thread::sleep(Duration::from_millis(self.execution.latency_ms));
        }

        let quote = self.quotes.quote(&order.symbol);
        if let Err(e) = &quote {
            warn!("Quote for {} failed: {}", order.symbol, e);
        }
        let reference = resolve_reference(&order, quote, &self.execution)?;

        let now = Utc::now();
        let mut trade = Trade::open(&order, reference.value(), now);
        match simulate(&order, reference, &self.execution) {
            Execution::Fill(price) => {
                self.ledger
                    .apply_fill(&mut trade, price, now, |filled, effect| {
                        filled.notes = fill_notes(price, effect);
                        self.store.save_trade(filled)
                    })?;
                self.persist_position(&trade.symbol);
                info!(
                    "Filled {} {} {} @ {:.4} ({})",
                    trade.side,
                    trade.quantity,
                    trade.symbol,
                    price.value(),
                    price.source()
                );
            }
            Execution::Pending => {
                self.store.save_trade(&trade)?;
                info!(
                    "Pending {} {} {} limit {:.4}, reference {:.4}",
                    trade.side,
                    trade.quantity,
                    trade.symbol,
                    trade.price,
                    reference.value()
                );
            }
        }
        Ok(trade)
    }

    /// Cancel an order that has not been filled yet. Loses cleanly to a
    /// concurrent fill: the stored row is only changed while it is still NEW.
    pub fn cancel_order(&self, id: &str) -> Result<Trade, FolioError> {
        let mut trade = self
            .store
            .get_trade(id)?
            .ok_or_else(|| FolioError::OrderNotFound { id: id.to_string() })?;
        trade.cancel()?;
        if !self.store.update_open_trade(&trade)? {
            let status = self
                .store
                .get_trade(id)?
                .map(|t| t.status)
                .unwrap_or(trade.status);
            return Err(FolioError::NotCancellable {
                id: id.to_string(),
                status,
            });
        }
        info!("Cancelled order {} ({} {})", trade.id, trade.side, trade.symbol);
        Ok(trade)
    }

    /// Re-evaluate every NEW order against fresh quotes.
    ///
    /// DAY orders from an earlier UTC day are cancelled. Orders whose quote
    /// fails keep waiting; synthetic prices are never used here. Orders
    /// settled by another request during the pass are skipped.
    pub fn process_pending(&self) -> Result<SweepOutcome, FolioError> {
        let Some(_permit) = self.sweep.try_begin() else {
            info!("Pending sweep already running");
            return Ok(SweepOutcome::AlreadyRunning);
        };

        let now = Utc::now();
        let mut sweep = PendingSweep::default();
        for mut trade in self.store.list_trades()? {
            let Some(order) = pending_order(&trade) else {
                continue;
            };

            if is_expired(&trade, now) {
                trade.cancel()?;
                trade.notes = Some("DAY order expired unfilled".to_string());
                if !self.store.update_open_trade(&trade)? {
                    info!("Order {} was settled elsewhere, skipping", trade.id);
                    continue;
                }
                info!("Expired DAY order {}", trade.id);
                sweep.expired.push(trade);
                continue;
            }

            let quote = match self.quotes.quote(&order.symbol) {
                Ok(q) if q.price.is_finite() && q.price > 0.0 => q,
                Ok(q) => {
                    warn!("Ignoring unusable quote {} for {}", q.price, order.symbol);
                    sweep.waiting += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Quote for {} failed: {}", order.symbol, e);
                    sweep.waiting += 1;
                    continue;
                }
            };

            match simulate(&order, FillPrice::Quoted(quote.price), &self.execution) {
                Execution::Pending => sweep.waiting += 1,
                Execution::Fill(price) => {
                    let result = self.ledger.apply_fill(&mut trade, price, now, |filled, effect| {
                        filled.notes = fill_notes(price, effect);
                        if self.store.update_open_trade(filled)? {
                            Ok(())
                        } else {
                            Err(FolioError::OrderConflict {
                                id: filled.id.clone(),
                            })
                        }
                    });
                    match result {
                        Ok(_) => {
                            self.persist_position(&trade.symbol);
                            info!("Filled pending order {} @ {:.4}", trade.id, price.value());
                            sweep.filled.push(trade);
                        }
                        Err(FolioError::RiskRejected { reason }) => {
                            trade.reject(&reason)?;
                            if !self.store.update_open_trade(&trade)? {
                                info!("Order {} was settled elsewhere, skipping", trade.id);
                                continue;
                            }
                            warn!("Rejected pending order {}: {}", trade.id, reason);
                            sweep.rejected.push(trade);
                        }
                        Err(FolioError::OrderConflict { id }) => {
                            info!("Order {} was settled elsewhere, skipping", id);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Ok(SweepOutcome::Completed(sweep))
    }

    /// Open positions, re-marked with live quotes where available.
    pub fn open_positions(&self) -> Vec<Position> {
        self.mark_all();
        self.ledger.positions()
    }

    /// Re-mark every position and rewrite the stored positions from the ledger.
    /// Non-reentrant: a second caller gets `AlreadyRunning`.
    pub fn sync_positions(&self) -> SyncOutcome {
        let Some(_permit) = self.sync.try_begin() else {
            info!("Sync already running");
            return SyncOutcome::AlreadyRunning;
        };
        info!("Sync started");

        let (marked, quote_failures) = self.mark_all();
        let mut write_failures = 0;

        let live = self.ledger.positions();
        for pos in &live {
            if let Err(e) = self.store.save_position(pos) {
                warn!("Failed to save position {}: {}", pos.symbol, e);
                write_failures += 1;
            }
        }
        match self.store.list_positions() {
            Ok(stored) => {
                for stale in stored.iter().filter(|p| self.ledger.get(&p.symbol).is_none()) {
                    if let Err(e) = self.store.delete_position(&stale.symbol) {
                        warn!("Failed to delete position {}: {}", stale.symbol, e);
                        write_failures += 1;
                    }
                }
            }
            Err(e) => {
                warn!("Failed to list stored positions: {}", e);
                write_failures += 1;
            }
        }

        info!(
            "Sync finished: {} marked, {} quote failures, {} write failures",
            marked, quote_failures, write_failures
        );
        SyncOutcome::Completed {
            marked,
            quote_failures,
            write_failures,
        }
    }

    /// Record already filled trades, oldest first, and apply them to the ledger.
    /// Trades the ledger refuses are skipped and reported. A storage failure
    /// stops the import; trades before it are kept.
    pub fn import_trades(&self, mut trades: Vec<Trade>) -> Result<ImportReport, FolioError> {
        trades.sort_by_key(|t| t.event_time());
        let mut report = ImportReport::default();
        for trade in trades {
            match self
                .ledger
                .apply_recorded(&trade, || self.store.save_trade(&trade))
            {
                Ok(_) => {
                    self.persist_position(&trade.symbol);
                    report.imported += 1;
                }
                Err(e @ (FolioError::InvalidOrder { .. } | FolioError::RiskRejected { .. })) => {
                    warn!("Skipping imported trade {} {}: {}", trade.side, trade.symbol, e);
                    report
                        .skipped
                        .push(format!("{} {} {}: {}", trade.side, trade.quantity, trade.symbol, e));
                }
                Err(e) => return Err(e),
            }
        }
        info!("Imported {} trades, skipped {}", report.imported, report.skipped.len());
        Ok(report)
    }

    pub fn trades(&self) -> Result<Vec<Trade>, FolioError> {
        self.store.list_trades()
    }

    pub fn analyze(&self) -> Result<PortfolioAnalysis, FolioError> {
        Ok(compute_analysis(&self.store.list_trades()?))
    }

    pub fn check_hypothesis(&self, text: &str) -> Result<HypothesisResult, FolioError> {
        Ok(check_hypothesis(&self.store.list_trades()?, text))
    }

    pub fn add_hypothesis(&self, text: &str, symbol: Option<&str>) -> Result<Hypothesis, FolioError> {
        let hypothesis = Hypothesis::new(text, symbol, Utc::now());
        self.store.save_hypothesis(&hypothesis)?;
        info!("Added hypothesis {}", hypothesis.id);
        Ok(hypothesis)
    }

    pub fn hypotheses(&self) -> Result<Vec<Hypothesis>, FolioError> {
        self.store.list_hypotheses()
    }

    pub fn record_validation(
        &self,
        id: &str,
        result: Judgement,
        notes: &str,
        date: DateTime<Utc>,
    ) -> Result<Hypothesis, FolioError> {
        let mut hypothesis = self.hypothesis(id)?;
        let before = hypothesis.status;
        hypothesis.record(result, notes, date);
        self.store.update_hypothesis(&hypothesis)?;
        if hypothesis.status != before {
            info!("Hypothesis {} is now {}", hypothesis.id, hypothesis.status);
        }
        Ok(hypothesis)
    }

    pub fn archive_hypothesis(&self, id: &str) -> Result<Hypothesis, FolioError> {
        let mut hypothesis = self.hypothesis(id)?;
        if hypothesis.archive() {
            self.store.update_hypothesis(&hypothesis)?;
            info!("Archived hypothesis {}", hypothesis.id);
        }
        Ok(hypothesis)
    }

    fn hypothesis(&self, id: &str) -> Result<Hypothesis, FolioError> {
        self.store
            .get_hypothesis(id)?
            .ok_or_else(|| FolioError::HypothesisNotFound { id: id.to_string() })
    }

    /// Quote every held symbol. A failed quote keeps the previous mark.
    fn mark_all(&self) -> (usize, usize) {
        let mut marked = 0;
        let mut failed = 0;
        for symbol in self.ledger.symbols() {
            match self.quotes.quote(&symbol) {
                Ok(q) if q.price.is_finite() && q.price > 0.0 => {
                    if self.ledger.mark(&symbol, q.price) {
                        marked += 1;
                    }
                }
                Ok(q) => {
                    warn!("Ignoring unusable quote {} for {}", q.price, symbol);
                    failed += 1;
                }
                Err(e) => {
                    warn!("Quote for {} failed, keeping last mark: {}", symbol, e);
                    failed += 1;
                }
            }
        }
        (marked, failed)
    }

    fn persist_position(&self, symbol: &str) {
        let result = match self.ledger.get(symbol) {
            Some(pos) => self.store.save_position(&pos),
            None => self.store.delete_position(symbol),
        };
        if let Err(e) = result {
            warn!("Position write for {} failed, next sync will repair it: {}", symbol, e);
        }
    }
}

fn fill_notes(price: FillPrice, effect: &FillEffect) -> Option<String> {
    let mut notes = Vec::new();
    if let FillPrice::Synthetic(p) = price {
        notes.push(format!("filled at synthetic price {p:.2}, no live quote"));
    }
    if let FillEffect::Sold(outcome) = effect {
        if outcome.clamped() {
            notes.push(format!(
                "sold {} of {} requested, the rest was not held",
                outcome.sold, outcome.requested
            ));
        }
    }
    if notes.is_empty() {
        None
    } else {
        Some(notes.join("; "))
    }
}
