//! Rule-based coaching messages derived from portfolio statistics.

use super::analysis::PortfolioAnalysis;

const MIN_CLOSED_FOR_RATES: usize = 5;
const MIN_TOTAL_TRADES: usize = 10;

struct SuggestionRule {
    applies: fn(&PortfolioAnalysis) -> bool,
    message: &'static str,
}

const RULES: &[SuggestionRule] = &[
    SuggestionRule {
        applies: |a| a.closed_trades() == 0,
        message: "No closed positions yet. Close a trade to start measuring realized performance.",
    },
    SuggestionRule {
        applies: |a| a.closed_trades() >= MIN_CLOSED_FOR_RATES && a.win_rate < 50.0,
        message: "Win rate is below 50%. Review your entry criteria before adding new positions.",
    },
    SuggestionRule {
        applies: |a| a.average_loss > 1.5 * a.average_profit,
        message: "Average loss is more than 1.5x average profit. Consider tighter stop-losses.",
    },
    SuggestionRule {
        applies: |a| {
            a.closed_trades() >= MIN_CLOSED_FOR_RATES && a.losing_trades > 2 * a.winning_trades
        },
        message: "Losing trades outnumber winners more than two to one. Reassess the strategy.",
    },
    SuggestionRule {
        applies: |a| a.total_trades < MIN_TOTAL_TRADES,
        message: "Fewer than 10 trades recorded. Results are not yet statistically meaningful.",
    },
    SuggestionRule {
        applies: |a| a.net_pnl < 0.0,
        message: "Net P&L is negative. Consider reducing position sizes until results improve.",
    },
];

const KEEP_GOING: &str = "Trading performance looks healthy. Keep following your plan.";

/// Every matching rule fires, in rule order. With no match, one encouragement.
pub fn suggest(analysis: &PortfolioAnalysis) -> Vec<String> {
    let mut messages: Vec<String> = RULES
        .iter()
        .filter(|rule| (rule.applies)(analysis))
        .map(|rule| rule.message.to_string())
        .collect();

    if messages.is_empty() {
        messages.push(KEEP_GOING.to_string());
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(wins: usize, losses: usize, avg_profit: f64, avg_loss: f64) -> PortfolioAnalysis {
        let total_profit = wins as f64 * avg_profit;
        let total_loss = losses as f64 * avg_loss;
        PortfolioAnalysis {
            total_trades: 2 * (wins + losses),
            winning_trades: wins,
            losing_trades: losses,
            total_profit,
            total_loss,
            net_pnl: total_profit - total_loss,
            average_profit: avg_profit,
            average_loss: avg_loss,
            win_rate: if wins + losses > 0 {
                wins as f64 / (wins + losses) as f64 * 100.0
            } else {
                0.0
            },
            ..Default::default()
        }
    }

    #[test]
    fn empty_history_gets_first_and_sample_size_rules() {
        let messages = suggest(&analysis(0, 0, 0.0, 0.0));
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("No closed positions"));
        assert!(messages[1].starts_with("Fewer than 10"));
    }

    #[test]
    fn all_matching_rules_fire_in_order() {
        let messages = suggest(&analysis(1, 5, 10.0, 40.0));
        assert_eq!(
            messages,
            vec![
                RULES[1].message.to_string(),
                RULES[2].message.to_string(),
                RULES[3].message.to_string(),
                RULES[5].message.to_string(),
            ]
        );
    }

    #[test]
    fn healthy_record_gets_encouragement() {
        let messages = suggest(&analysis(8, 2, 100.0, 50.0));
        assert_eq!(messages, vec![KEEP_GOING.to_string()]);
    }

    #[test]
    fn all_loss_record_fires_loss_ratio_rule() {
        let messages = suggest(&analysis(0, 6, 0.0, 50.0));
        assert!(messages.contains(&RULES[2].message.to_string()));
    }

    #[test]
    fn loss_ratio_rule_is_silent_without_losses() {
        let messages = suggest(&analysis(6, 0, 50.0, 0.0));
        assert!(!messages.contains(&RULES[2].message.to_string()));
    }
}
