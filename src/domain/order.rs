//! Order model and structural validation.
//!
//! Callers submit a loosely typed [`OrderRequest`]; [`validate_order`] turns it
//! into a normalized, immutable [`Order`] or explains why it cannot be accepted.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::FolioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "MARKET" => Some(OrderType::Market),
            "LIMIT" => Some(OrderType::Limit),
            _ => None,
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    #[default]
    Day,
    Gtc,
}

impl TimeInForce {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "DAY" => Some(TimeInForce::Day),
            "GTC" => Some(TimeInForce::Gtc),
            _ => None,
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeInForce::Day => write!(f, "DAY"),
            TimeInForce::Gtc => write!(f, "GTC"),
        }
    }
}

/// Raw order input as it arrives from a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: String,
    pub quantity: Option<f64>,
    pub order_type: String,
    pub limit_price: Option<f64>,
    pub time_in_force: Option<String>,
}

/// How an accepted order is priced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Market,
    Limit { limit_price: f64 },
}

/// A validated, normalized order. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub kind: OrderKind,
    pub time_in_force: TimeInForce,
}

impl Order {
    pub fn order_type(&self) -> OrderType {
        match self.kind {
            OrderKind::Market => OrderType::Market,
            OrderKind::Limit { .. } => OrderType::Limit,
        }
    }

    pub fn limit_price(&self) -> Option<f64> {
        match self.kind {
            OrderKind::Market => None,
            OrderKind::Limit { limit_price } => Some(limit_price),
        }
    }

    /// The request this order would have been validated from.
    pub fn to_request(&self) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side: self.side.to_string(),
            quantity: Some(self.quantity as f64),
            order_type: self.order_type().to_string(),
            limit_price: self.limit_price(),
            time_in_force: Some(self.time_in_force.to_string()),
        }
    }
}

/// Check an order request for structural problems and normalize it.
///
/// The symbol is trimmed and uppercased and the quantity floored. Nothing else
/// is touched, so validating an already-normalized order is a no-op.
pub fn validate_order(request: &OrderRequest) -> Result<Order, FolioError> {
    let symbol = request.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(FolioError::invalid_order("symbol is required"));
    }

    let side = Side::parse(&request.side).ok_or_else(|| {
        FolioError::invalid_order(format!("side must be BUY or SELL, got '{}'", request.side))
    })?;

    let quantity = validate_quantity(request.quantity)?;

    let order_type = OrderType::parse(&request.order_type).ok_or_else(|| {
        FolioError::invalid_order(format!(
            "order type must be MARKET or LIMIT, got '{}'",
            request.order_type
        ))
    })?;

    let kind = match order_type {
        OrderType::Market => OrderKind::Market,
        OrderType::Limit => match request.limit_price {
            Some(p) if p.is_finite() && p > 0.0 => OrderKind::Limit { limit_price: p },
            _ => {
                return Err(FolioError::invalid_order(
                    "limit orders need a positive limit price",
                ));
            }
        },
    };

    let time_in_force = match request.time_in_force.as_deref() {
        None => TimeInForce::default(),
        Some(s) if s.trim().is_empty() => TimeInForce::default(),
        Some(s) => TimeInForce::parse(s).ok_or_else(|| {
            FolioError::invalid_order(format!("time in force must be DAY or GTC, got '{s}'"))
        })?,
    };

    Ok(Order {
        symbol,
        side,
        quantity,
        kind,
        time_in_force,
    })
}

fn validate_quantity(quantity: Option<f64>) -> Result<i64, FolioError> {
    let raw = quantity.ok_or_else(|| FolioError::invalid_order("quantity is required"))?;
    if !raw.is_finite() {
        return Err(FolioError::invalid_order("quantity must be a number"));
    }
    let floored = raw.floor();
    if floored < 1.0 {
        return Err(FolioError::invalid_order("quantity must be at least 1 share"));
    }
    if floored > i64::MAX as f64 {
        return Err(FolioError::invalid_order("quantity is too large"));
    }
    Ok(floored as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(symbol: &str, side: &str, qty: Option<f64>, order_type: &str) -> OrderRequest {
        OrderRequest {
            symbol: symbol.to_string(),
            side: side.to_string(),
            quantity: qty,
            order_type: order_type.to_string(),
            limit_price: None,
            time_in_force: None,
        }
    }

    fn assert_invalid(req: &OrderRequest) {
        match validate_order(req) {
            Err(FolioError::InvalidOrder { .. }) => {}
            other => panic!("expected InvalidOrder, got {:?}", other),
        }
    }

    #[test]
    fn normalizes_symbol_and_quantity() {
        let order = validate_order(&request("  aapl ", "buy", Some(10.7), "market")).unwrap();
        assert_eq!(order.symbol, "AAPL");
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.quantity, 10);
        assert_eq!(order.kind, OrderKind::Market);
        assert_eq!(order.time_in_force, TimeInForce::Day);
    }

    #[test]
    fn rejects_empty_symbol() {
        assert_invalid(&request("   ", "BUY", Some(1.0), "MARKET"));
    }

    #[test]
    fn rejects_unknown_side() {
        assert_invalid(&request("AAPL", "HOLD", Some(1.0), "MARKET"));
    }

    #[test]
    fn rejects_missing_zero_negative_and_fractional_quantity() {
        assert_invalid(&request("AAPL", "BUY", None, "MARKET"));
        assert_invalid(&request("AAPL", "BUY", Some(0.0), "MARKET"));
        assert_invalid(&request("AAPL", "BUY", Some(-5.0), "MARKET"));
        assert_invalid(&request("AAPL", "BUY", Some(0.5), "MARKET"));
        assert_invalid(&request("AAPL", "BUY", Some(f64::NAN), "MARKET"));
    }

    #[test]
    fn rejects_unknown_type() {
        assert_invalid(&request("AAPL", "BUY", Some(1.0), "STOP"));
    }

    #[test]
    fn limit_requires_positive_price() {
        let mut req = request("AAPL", "BUY", Some(1.0), "LIMIT");
        assert_invalid(&req);
        req.limit_price = Some(0.0);
        assert_invalid(&req);
        req.limit_price = Some(-1.0);
        assert_invalid(&req);
        req.limit_price = Some(100.0);
        let order = validate_order(&req).unwrap();
        assert_eq!(order.limit_price(), Some(100.0));
        assert_eq!(order.order_type(), OrderType::Limit);
    }

    #[test]
    fn market_order_ignores_limit_price() {
        let mut req = request("AAPL", "SELL", Some(3.0), "MARKET");
        req.limit_price = Some(50.0);
        let order = validate_order(&req).unwrap();
        assert_eq!(order.limit_price(), None);
    }

    #[test]
    fn parses_time_in_force() {
        let mut req = request("AAPL", "BUY", Some(1.0), "MARKET");
        req.time_in_force = Some("gtc".into());
        assert_eq!(validate_order(&req).unwrap().time_in_force, TimeInForce::Gtc);
        req.time_in_force = Some("IOC".into());
        assert_invalid(&req);
    }

    #[test]
    fn validation_is_idempotent() {
        let mut req = request(" msft", "Sell", Some(7.9), "limit");
        req.limit_price = Some(310.5);
        let once = validate_order(&req).unwrap();
        let twice = validate_order(&once.to_request()).unwrap();
        assert_eq!(once, twice);
    }
}
