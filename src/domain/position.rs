//! Position tracking with a single blended cost basis per symbol.

use serde::{Deserialize, Serialize};

/// Held shares of one symbol.
///
/// `quantity` and `average_cost` change only on fills; `current_price` is the
/// last observed mark and moves independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub average_cost: f64,
    pub current_price: Option<f64>,
}

/// What a sell did to a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellOutcome {
    pub requested: i64,
    pub sold: i64,
    /// `None` when nothing was held, so nothing was realized.
    pub realized_pnl: Option<f64>,
    pub remaining: i64,
}

impl SellOutcome {
    pub fn clamped(&self) -> bool {
        self.sold < self.requested
    }
}

impl Position {
    pub fn open(symbol: &str, quantity: i64, price: f64) -> Self {
        let position = Position {
            symbol: symbol.to_string(),
            quantity,
            average_cost: price,
            current_price: None,
        };
        position.check_invariant();
        position
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    /// Add shares, blending the new price into the average cost.
    pub fn buy(&mut self, quantity: i64, price: f64) {
        assert!(quantity > 0, "buy quantity must be positive, got {quantity}");
        let total = self.quantity + quantity;
        self.average_cost =
            (self.average_cost * self.quantity as f64 + price * quantity as f64) / total as f64;
        self.quantity = total;
        self.check_invariant();
    }

    /// Remove up to `quantity` shares. Over-sells are clamped to what is held.
    /// The remaining basis never moves on a sell.
    pub fn sell(&mut self, quantity: i64, price: f64) -> SellOutcome {
        assert!(quantity > 0, "sell quantity must be positive, got {quantity}");
        let sold = quantity.min(self.quantity);
        let realized_pnl = if sold > 0 {
            Some((price - self.average_cost) * sold as f64)
        } else {
            None
        };
        self.quantity -= sold;
        if self.quantity == 0 {
            self.average_cost = 0.0;
        }
        self.check_invariant();
        SellOutcome {
            requested: quantity,
            sold,
            realized_pnl,
            remaining: self.quantity,
        }
    }

    pub fn mark(&mut self, price: f64) {
        self.current_price = Some(price);
    }

    /// Latest mark, or the average cost when no mark has been seen yet.
    pub fn current_price(&self) -> f64 {
        self.current_price.unwrap_or(self.average_cost)
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity as f64 * self.average_cost
    }

    pub fn market_value(&self) -> f64 {
        self.quantity as f64 * self.current_price()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.quantity as f64 * (self.current_price() - self.average_cost)
    }

    pub fn unrealized_pnl_percent(&self) -> f64 {
        let basis = self.cost_basis();
        if basis > 0.0 {
            self.unrealized_pnl() / basis * 100.0
        } else {
            0.0
        }
    }

    pub fn view(&self) -> PositionView {
        PositionView {
            symbol: self.symbol.clone(),
            quantity: self.quantity,
            average_cost: self.average_cost,
            current_price: self.current_price(),
            market_value: self.market_value(),
            unrealized_pnl: self.unrealized_pnl(),
            unrealized_pnl_percent: self.unrealized_pnl_percent(),
        }
    }

    /// Panics if the cost basis invariants do not hold.
    pub fn check_invariant(&self) {
        assert!(
            self.quantity >= 0,
            "{}: negative quantity {}",
            self.symbol,
            self.quantity
        );
        assert!(
            self.average_cost.is_finite() && self.average_cost >= 0.0,
            "{}: bad average cost {}",
            self.symbol,
            self.average_cost
        );
        assert!(
            (self.quantity == 0) == (self.average_cost == 0.0),
            "{}: quantity {} with average cost {}",
            self.symbol,
            self.quantity,
            self.average_cost
        );
    }
}

/// A position as shown to callers, with mark-derived figures filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub symbol: String,
    pub quantity: i64,
    pub average_cost: f64,
    pub current_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_percent: f64,
}
