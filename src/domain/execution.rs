//! Fill simulation.
//!
//! Market orders fill immediately at the reference price, adjusted for
//! slippage. Limit orders fill at the reference price only when it satisfies
//! the limit and otherwise stay pending. The simulator never splits an order.

use chrono::{DateTime, Utc};

use super::error::FolioError;
use super::order::{Order, OrderKind, Side, TimeInForce};
use super::trade::{FillPrice, Trade, TradeStatus};
use crate::ports::quote_port::Quote;

/// Configuration for simulated execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub slippage_pct: f64,
    /// Fill against a stand-in price when the price source is down.
    pub synthetic_pricing: bool,
    /// Stand-in reference for market orders when `synthetic_pricing` is on.
    pub synthetic_price: f64,
    /// Pause before fetching a quote, to mimic a network round trip.
    pub latency_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            slippage_pct: 0.0,
            synthetic_pricing: false,
            synthetic_price: 100.0,
            latency_ms: 0,
        }
    }
}

/// Buy: execution_price = market_price * (1 + slippage_pct / 100)
pub fn apply_slippage_buy(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct / 100.0)
}

/// Sell: execution_price = market_price * (1 - slippage_pct / 100)
pub fn apply_slippage_sell(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct / 100.0)
}

/// What the simulator decided for an order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Execution {
    Fill(FillPrice),
    Pending,
}

/// Pick the reference price for an order from a quote lookup.
///
/// A live quote always wins. Without one, the order fails unless synthetic
/// pricing is switched on, in which case limit orders use their limit and
/// market orders the configured stand-in. Synthetic prices are tagged as such.
pub fn resolve_reference(
    order: &Order,
    quote: Result<Quote, FolioError>,
    config: &ExecutionConfig,
) -> Result<FillPrice, FolioError> {
    let reason = match quote {
        Ok(q) if q.price.is_finite() && q.price > 0.0 => return Ok(FillPrice::Quoted(q.price)),
        Ok(q) => format!("unusable price {}", q.price),
        Err(e) => e.to_string(),
    };

    if !config.synthetic_pricing {
        return Err(FolioError::UpstreamUnavailable {
            symbol: order.symbol.clone(),
            reason,
        });
    }

    let synthetic = match order.kind {
        OrderKind::Limit { limit_price } => limit_price,
        OrderKind::Market => config.synthetic_price,
    };
    Ok(FillPrice::Synthetic(synthetic))
}

/// Decide whether an order fills against `reference`.
pub fn simulate(order: &Order, reference: FillPrice, config: &ExecutionConfig) -> Execution {
    match order.kind {
        OrderKind::Market => {
            let slipped = reference.map(|p| match order.side {
                Side::Buy => apply_slippage_buy(p, config.slippage_pct),
                Side::Sell => apply_slippage_sell(p, config.slippage_pct),
            });
            Execution::Fill(slipped)
        }
        OrderKind::Limit { limit_price } => {
            if limit_satisfied(order.side, reference.value(), limit_price) {
                Execution::Fill(reference)
            } else {
                Execution::Pending
            }
        }
    }
}

/// BUY fills at or below the limit, SELL at or above it.
pub fn limit_satisfied(side: Side, price: f64, limit_price: f64) -> bool {
    match side {
        Side::Buy => price <= limit_price,
        Side::Sell => price >= limit_price,
    }
}

/// Rebuild the order a pending trade was opened for.
pub fn pending_order(trade: &Trade) -> Option<Order> {
    if trade.status != TradeStatus::New {
        return None;
    }
    let kind = match trade.limit_price {
        Some(limit_price) => OrderKind::Limit { limit_price },
        None => OrderKind::Market,
    };
    Some(Order {
        symbol: trade.symbol.clone(),
        side: trade.side,
        quantity: trade.quantity,
        kind,
        time_in_force: trade.time_in_force,
    })
}

/// A DAY order still open on a later UTC day than it was placed has lapsed.
pub fn is_expired(trade: &Trade, now: DateTime<Utc>) -> bool {
    trade.status == TradeStatus::New
        && trade.time_in_force == TimeInForce::Day
        && now.date_naive() > trade.created_at.date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn order(side: Side, kind: OrderKind) -> Order {
        Order {
            symbol: "AAPL".into(),
            side,
            quantity: 10,
            kind,
            time_in_force: TimeInForce::Day,
        }
    }

    fn quote(price: f64) -> Result<Quote, FolioError> {
        Ok(Quote {
            symbol: "AAPL".into(),
            price,
        })
    }

    fn down() -> Result<Quote, FolioError> {
        Err(FolioError::UpstreamUnavailable {
            symbol: "AAPL".into(),
            reason: "timeout".into(),
        })
    }

    #[test]
    fn slippage_directions() {
        assert_relative_eq!(apply_slippage_buy(100.0, 0.5), 100.5);
        assert_relative_eq!(apply_slippage_sell(100.0, 0.5), 99.5);
    }

    #[test]
    fn market_order_fills_immediately() {
        let o = order(Side::Buy, OrderKind::Market);
        let exec = simulate(&o, FillPrice::Quoted(101.0), &ExecutionConfig::default());
        assert_eq!(exec, Execution::Fill(FillPrice::Quoted(101.0)));
    }

    #[test]
    fn market_sell_applies_slippage() {
        let o = order(Side::Sell, OrderKind::Market);
        let config = ExecutionConfig {
            slippage_pct: 1.0,
            ..Default::default()
        };
        match simulate(&o, FillPrice::Quoted(200.0), &config) {
            Execution::Fill(FillPrice::Quoted(p)) => assert_relative_eq!(p, 198.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn buy_limit_waits_above_limit_and_fills_below() {
        let o = order(Side::Buy, OrderKind::Limit { limit_price: 100.0 });
        let config = ExecutionConfig::default();
        assert_eq!(simulate(&o, FillPrice::Quoted(105.0), &config), Execution::Pending);
        assert_eq!(
            simulate(&o, FillPrice::Quoted(95.0), &config),
            Execution::Fill(FillPrice::Quoted(95.0))
        );
        assert_eq!(
            simulate(&o, FillPrice::Quoted(100.0), &config),
            Execution::Fill(FillPrice::Quoted(100.0))
        );
    }

    #[test]
    fn sell_limit_waits_below_limit() {
        let o = order(Side::Sell, OrderKind::Limit { limit_price: 100.0 });
        let config = ExecutionConfig::default();
        assert_eq!(simulate(&o, FillPrice::Quoted(95.0), &config), Execution::Pending);
        assert_eq!(
            simulate(&o, FillPrice::Quoted(105.0), &config),
            Execution::Fill(FillPrice::Quoted(105.0))
        );
    }

    #[test]
    fn live_quote_is_preferred() {
        let o = order(Side::Buy, OrderKind::Market);
        let config = ExecutionConfig {
            synthetic_pricing: true,
            ..Default::default()
        };
        assert_eq!(
            resolve_reference(&o, quote(123.0), &config).unwrap(),
            FillPrice::Quoted(123.0)
        );
    }

    #[test]
    fn missing_quote_fails_without_synthetic_pricing() {
        let o = order(Side::Buy, OrderKind::Market);
        let err = resolve_reference(&o, down(), &ExecutionConfig::default()).unwrap_err();
        assert!(matches!(err, FolioError::UpstreamUnavailable { .. }));
    }

    #[test]
    fn zero_quote_counts_as_unavailable() {
        let o = order(Side::Buy, OrderKind::Market);
        let err = resolve_reference(&o, quote(0.0), &ExecutionConfig::default()).unwrap_err();
        assert!(err.to_string().contains("unusable price"));
    }

    #[test]
    fn synthetic_price_is_tagged() {
        let config = ExecutionConfig {
            synthetic_pricing: true,
            synthetic_price: 50.0,
            ..Default::default()
        };
        let market = order(Side::Buy, OrderKind::Market);
        assert_eq!(
            resolve_reference(&market, down(), &config).unwrap(),
            FillPrice::Synthetic(50.0)
        );
        let limit = order(Side::Buy, OrderKind::Limit { limit_price: 80.0 });
        assert_eq!(
            resolve_reference(&limit, down(), &config).unwrap(),
            FillPrice::Synthetic(80.0)
        );
    }

    #[test]
    fn pending_order_rebuilds_limit() {
        let o = order(Side::Buy, OrderKind::Limit { limit_price: 100.0 });
        let trade = Trade::open(&o, 105.0, Utc::now());
        assert_eq!(pending_order(&trade), Some(o));
    }

    #[test]
    fn day_orders_expire_next_day() {
        let o = order(Side::Buy, OrderKind::Limit { limit_price: 100.0 });
        let placed = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();
        let trade = Trade::open(&o, 105.0, placed);
        assert!(!is_expired(&trade, placed + chrono::Duration::hours(2)));
        assert!(is_expired(&trade, placed + chrono::Duration::hours(10)));

        let mut gtc = trade.clone();
        gtc.time_in_force = TimeInForce::Gtc;
        assert!(!is_expired(&gtc, placed + chrono::Duration::days(30)));
    }
}
