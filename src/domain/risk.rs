//! Pre-execution risk policy.

use std::collections::BTreeSet;

use super::error::FolioError;
use super::order::Order;

#[derive(Debug, Clone, PartialEq)]
pub struct RiskPolicy {
    pub trading_enabled: bool,
    pub max_quantity: i64,
    /// Empty means every symbol is allowed.
    pub allowed_symbols: BTreeSet<String>,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        RiskPolicy {
            trading_enabled: true,
            max_quantity: 10_000,
            allowed_symbols: BTreeSet::new(),
        }
    }
}

impl RiskPolicy {
    /// Run the checks in order; the first failing check decides the reason.
    pub fn check(&self, order: &Order) -> Result<(), FolioError> {
        if order.quantity > self.max_quantity {
            return Err(FolioError::risk_rejected(format!(
                "quantity {} exceeds the maximum of {} shares per order",
                order.quantity, self.max_quantity
            )));
        }

        if !self.allowed_symbols.is_empty() && !self.allowed_symbols.contains(&order.symbol) {
            return Err(FolioError::risk_rejected(format!(
                "{} is not on the list of tradable symbols",
                order.symbol
            )));
        }

        if !self.trading_enabled {
            return Err(FolioError::risk_rejected("trading is currently disabled"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderKind, Side, TimeInForce};

    fn order(symbol: &str, quantity: i64) -> Order {
        Order {
            symbol: symbol.to_string(),
            side: Side::Buy,
            quantity,
            kind: OrderKind::Market,
            time_in_force: TimeInForce::Day,
        }
    }

    fn reason(result: Result<(), FolioError>) -> String {
        match result {
            Err(FolioError::RiskRejected { reason }) => reason,
            other => panic!("expected RiskRejected, got {:?}", other),
        }
    }

    #[test]
    fn default_policy_accepts_ordinary_order() {
        assert!(RiskPolicy::default().check(&order("AAPL", 10)).is_ok());
    }

    #[test]
    fn rejects_over_max_quantity() {
        let policy = RiskPolicy {
            max_quantity: 100,
            ..Default::default()
        };
        assert!(policy.check(&order("AAPL", 100)).is_ok());
        assert!(reason(policy.check(&order("AAPL", 101))).contains("exceeds"));
    }

    #[test]
    fn rejects_symbol_outside_allow_list() {
        let policy = RiskPolicy {
            allowed_symbols: ["AAPL", "MSFT"].iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        assert!(policy.check(&order("MSFT", 1)).is_ok());
        assert!(reason(policy.check(&order("TSLA", 1))).contains("TSLA"));
    }

    #[test]
    fn disabled_trading_rejects_orders_that_pass_other_checks() {
        let policy = RiskPolicy {
            trading_enabled: false,
            ..Default::default()
        };
        assert!(reason(policy.check(&order("AAPL", 1))).contains("disabled"));
    }

    #[test]
    fn quantity_then_allow_list_then_switch() {
        let policy = RiskPolicy {
            trading_enabled: false,
            max_quantity: 1,
            allowed_symbols: ["AAPL"].iter().map(|s| s.to_string()).collect(),
        };
        assert!(reason(policy.check(&order("TSLA", 50))).contains("exceeds"));
        assert!(reason(policy.check(&order("TSLA", 1))).contains("TSLA"));
        assert!(reason(policy.check(&order("AAPL", 1))).contains("disabled"));
    }
}
