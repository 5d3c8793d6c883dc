//! Trade records and their status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::FolioError;
use super::order::{Order, OrderType, Side, TimeInForce};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl TradeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TradeStatus::Filled | TradeStatus::Cancelled | TradeStatus::Rejected
        )
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NEW" => Some(TradeStatus::New),
            "PARTIALLY_FILLED" => Some(TradeStatus::PartiallyFilled),
            "FILLED" => Some(TradeStatus::Filled),
            "CANCELLED" => Some(TradeStatus::Cancelled),
            "REJECTED" => Some(TradeStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeStatus::New => "NEW",
            TradeStatus::PartiallyFilled => "PARTIALLY_FILLED",
            TradeStatus::Filled => "FILLED",
            TradeStatus::Cancelled => "CANCELLED",
            TradeStatus::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

/// Where a fill price came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "price", rename_all = "snake_case")]
pub enum FillPrice {
    /// Live quote from the price source.
    Quoted(f64),
    /// Stand-in used when the price source was down and synthetic pricing is enabled.
    Synthetic(f64),
    /// Entered by hand or imported from a journal.
    Manual(f64),
}

impl FillPrice {
    pub fn value(self) -> f64 {
        match self {
            FillPrice::Quoted(p) | FillPrice::Synthetic(p) | FillPrice::Manual(p) => p,
        }
    }

    pub fn source(self) -> &'static str {
        match self {
            FillPrice::Quoted(_) => "quoted",
            FillPrice::Synthetic(_) => "synthetic",
            FillPrice::Manual(_) => "manual",
        }
    }

    pub fn from_parts(source: &str, price: f64) -> Option<Self> {
        match source {
            "quoted" => Some(FillPrice::Quoted(price)),
            "synthetic" => Some(FillPrice::Synthetic(price)),
            "manual" => Some(FillPrice::Manual(price)),
            _ => None,
        }
    }

    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            FillPrice::Quoted(p) => FillPrice::Quoted(f(p)),
            FillPrice::Synthetic(p) => FillPrice::Synthetic(f(p)),
            FillPrice::Manual(p) => FillPrice::Manual(f(p)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub quantity: i64,
    pub price: FillPrice,
    pub filled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub status: TradeStatus,
    pub quantity: i64,
    /// Requested price: the limit for limit orders, the reference price otherwise.
    pub price: f64,
    pub limit_price: Option<f64>,
    pub time_in_force: TimeInForce,
    pub created_at: DateTime<Utc>,
    pub fill: Option<Fill>,
    pub notes: Option<String>,
}

impl Trade {
    /// A fresh NEW trade for an accepted order.
    pub fn open(order: &Order, reference_price: f64, created_at: DateTime<Utc>) -> Self {
        Trade {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type(),
            status: TradeStatus::New,
            quantity: order.quantity,
            price: order.limit_price().unwrap_or(reference_price),
            limit_price: order.limit_price(),
            time_in_force: order.time_in_force,
            created_at,
            fill: None,
            notes: None,
        }
    }

    /// An already filled trade entered by hand, e.g. from an imported journal.
    pub fn manual(
        symbol: &str,
        side: Side,
        quantity: i64,
        price: f64,
        filled_at: DateTime<Utc>,
    ) -> Self {
        Trade {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.trim().to_uppercase(),
            side,
            order_type: OrderType::Market,
            status: TradeStatus::Filled,
            quantity,
            price,
            limit_price: None,
            time_in_force: TimeInForce::Day,
            created_at: filled_at,
            fill: Some(Fill {
                quantity,
                price: FillPrice::Manual(price),
                filled_at,
            }),
            notes: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn filled_quantity(&self) -> i64 {
        self.fill.map(|f| f.quantity).unwrap_or(0)
    }

    pub fn average_fill_price(&self) -> Option<f64> {
        self.fill.map(|f| f.price.value())
    }

    pub fn filled_at(&self) -> Option<DateTime<Utc>> {
        self.fill.map(|f| f.filled_at)
    }

    /// When the trade happened: the fill time if filled, otherwise creation time.
    pub fn event_time(&self) -> DateTime<Utc> {
        self.filled_at().unwrap_or(self.created_at)
    }

    /// Fill the whole order. Only a NEW trade can be filled.
    pub fn fill_completely(
        &mut self,
        price: FillPrice,
        filled_at: DateTime<Utc>,
    ) -> Result<(), FolioError> {
        self.ensure_new("filled")?;
        self.fill = Some(Fill {
            quantity: self.quantity,
            price,
            filled_at,
        });
        self.status = TradeStatus::Filled;
        Ok(())
    }

    /// Fill part of the order. The trade stays open for the remainder.
    pub fn fill_partially(
        &mut self,
        quantity: i64,
        price: FillPrice,
        filled_at: DateTime<Utc>,
    ) -> Result<(), FolioError> {
        self.ensure_new("partially filled")?;
        if quantity <= 0 || quantity >= self.quantity {
            return Err(FolioError::invalid_order(format!(
                "partial fill of {} must be between 1 and {}",
                quantity,
                self.quantity - 1
            )));
        }
        self.fill = Some(Fill {
            quantity,
            price,
            filled_at,
        });
        self.status = TradeStatus::PartiallyFilled;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), FolioError> {
        if self.status != TradeStatus::New {
            return Err(FolioError::NotCancellable {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = TradeStatus::Cancelled;
        Ok(())
    }

    pub fn reject(&mut self, reason: &str) -> Result<(), FolioError> {
        self.ensure_new("rejected")?;
        self.status = TradeStatus::Rejected;
        self.notes = Some(reason.to_string());
        Ok(())
    }

    fn ensure_new(&self, action: &str) -> Result<(), FolioError> {
        if self.status == TradeStatus::New {
            Ok(())
        } else {
            Err(FolioError::invalid_order(format!(
                "order {} is {} and cannot be {}",
                self.id, self.status, action
            )))
        }
    }
}
