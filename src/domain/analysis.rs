//! Realized P&L replay and portfolio statistics.
//!
//! A pure function of the trade list: filled trades are grouped by symbol,
//! replayed oldest first through a [`PositionBook`], and every sell that closes
//! against held shares yields one realized P&L figure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ledger::{OversellPolicy, PositionBook};
use super::order::Side;
use super::suggestions::suggest;
use super::trade::{Trade, TradeStatus};

/// One sell that closed against a held position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizedTrade {
    pub trade_id: String,
    pub symbol: String,
    pub quantity: i64,
    pub pnl: f64,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolResult {
    pub symbol: String,
    pub closed_trades: usize,
    pub winning_trades: usize,
    pub win_rate: f64,
    pub net_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioAnalysis {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub break_even_trades: usize,
    pub total_profit: f64,
    pub total_loss: f64,
    pub net_pnl: f64,
    pub average_profit: f64,
    pub average_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Percentage, 0 when nothing has been closed.
    pub win_rate: f64,
    pub by_symbol: Vec<SymbolResult>,
    pub suggestions: Vec<String>,
}

impl PortfolioAnalysis {
    pub fn closed_trades(&self) -> usize {
        self.winning_trades + self.losing_trades + self.break_even_trades
    }
}

/// The fill of a trade, if it can take part in a replay.
fn replayable(trade: &Trade) -> Option<(i64, f64)> {
    if trade.status != TradeStatus::Filled {
        return None;
    }
    let fill = trade.fill?;
    let price = fill.price.value();
    if fill.quantity <= 0 || !price.is_finite() || price <= 0.0 {
        return None;
    }
    Some((fill.quantity, price))
}

/// Filled trades grouped by symbol, each group oldest first.
///
/// Ties on time keep input order, so the replay is deterministic.
fn chronological_groups(trades: &[Trade]) -> BTreeMap<&str, Vec<&Trade>> {
    let mut groups: BTreeMap<&str, Vec<&Trade>> = BTreeMap::new();
    for trade in trades.iter().filter(|t| replayable(t).is_some()) {
        groups.entry(trade.symbol.as_str()).or_default().push(trade);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|t| t.event_time());
    }
    groups
}

/// Replay filled trades and return the realized P&L of every closing sell.
pub fn realized_trades(trades: &[Trade]) -> Vec<RealizedTrade> {
    let mut realized = Vec::new();
    let mut book = PositionBook::new(OversellPolicy::Clamp);

    for (symbol, group) in chronological_groups(trades) {
        for trade in group {
            let Some((quantity, price)) = replayable(trade) else {
                continue;
            };
            match trade.side {
                Side::Buy => {
                    book.apply_buy(symbol, quantity, price);
                }
                Side::Sell => {
                    let Ok(outcome) = book.apply_sell(symbol, quantity, price) else {
                        continue;
                    };
                    if let Some(pnl) = outcome.realized_pnl {
                        realized.push(RealizedTrade {
                            trade_id: trade.id.clone(),
                            symbol: symbol.to_string(),
                            quantity: outcome.sold,
                            pnl,
                            closed_at: trade.event_time(),
                        });
                    }
                }
            }
        }
    }

    realized
}

/// Compute portfolio statistics from a trade history.
pub fn compute_analysis(trades: &[Trade]) -> PortfolioAnalysis {
    let total_trades = trades.iter().filter(|t| replayable(t).is_some()).count();
    let realized = realized_trades(trades);

    let mut analysis = summarize(total_trades, realized.iter().map(|r| r.pnl));
    analysis.by_symbol = per_symbol(&realized);
    analysis.suggestions = suggest(&analysis);
    analysis
}

fn summarize(total_trades: usize, pnls: impl Iterator<Item = f64>) -> PortfolioAnalysis {
    let mut winning_trades = 0usize;
    let mut losing_trades = 0usize;
    let mut break_even_trades = 0usize;
    let mut total_profit = 0.0_f64;
    let mut total_loss = 0.0_f64;
    let mut largest_win = 0.0_f64;
    let mut largest_loss = 0.0_f64;

    for pnl in pnls {
        if pnl > 0.0 {
            winning_trades += 1;
            total_profit += pnl;
            if pnl > largest_win {
                largest_win = pnl;
            }
        } else if pnl < 0.0 {
            losing_trades += 1;
            total_loss += pnl.abs();
            if pnl.abs() > largest_loss {
                largest_loss = pnl.abs();
            }
        } else {
            break_even_trades += 1;
        }
    }

    let closed = winning_trades + losing_trades + break_even_trades;
    let win_rate = if closed > 0 {
        winning_trades as f64 / closed as f64 * 100.0
    } else {
        0.0
    };

    let average_profit = if winning_trades > 0 {
        total_profit / winning_trades as f64
    } else {
        0.0
    };

    let average_loss = if losing_trades > 0 {
        total_loss / losing_trades as f64
    } else {
        0.0
    };

    PortfolioAnalysis {
        total_trades,
        winning_trades,
        losing_trades,
        break_even_trades,
        total_profit,
        total_loss,
        net_pnl: total_profit - total_loss,
        average_profit,
        average_loss,
        largest_win,
        largest_loss,
        win_rate,
        by_symbol: Vec::new(),
        suggestions: Vec::new(),
    }
}

fn per_symbol(realized: &[RealizedTrade]) -> Vec<SymbolResult> {
    let mut grouped: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for r in realized {
        grouped.entry(r.symbol.as_str()).or_default().push(r.pnl);
    }

    grouped
        .into_iter()
        .map(|(symbol, pnls)| {
            let winning_trades = pnls.iter().filter(|&&p| p > 0.0).count();
            SymbolResult {
                symbol: symbol.to_string(),
                closed_trades: pnls.len(),
                winning_trades,
                win_rate: winning_trades as f64 / pnls.len() as f64 * 100.0,
                net_pnl: pnls.iter().sum(),
            }
        })
        .collect()
}
