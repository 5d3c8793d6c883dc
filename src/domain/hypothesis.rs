//! Trading hypotheses: free-text constraint extraction, evidence from the trade
//! history, and the user-judged hypothesis record.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::analysis::compute_analysis;
use super::trade::Trade;

const MAX_SYMBOL_LEN: usize = 10;
const VALIDATED_AFTER: u32 = 5;
const INVALIDATED_AFTER: u32 = 3;

/// Uppercase words that read like tickers but never are.
const STOP_WORDS: &[&str] = &[
    "I", "A", "AM", "PM", "ET", "EST", "UTC", "GMT", "PNL", "P&L", "OK", "IF", "IS", "IT", "MY",
    "ON", "AT", "IN", "OR", "AND", "THE", "BUY", "SELL",
];

/// Named trading periods, in UTC hours, half-open.
const PERIODS: &[(&str, &str, u32, u32)] = &[
    ("premarket", "pre-market", 4, 9),
    ("pre-market", "pre-market", 4, 9),
    ("opening", "opening", 9, 10),
    ("open", "opening", 9, 10),
    ("morning", "morning", 9, 12),
    ("midday", "midday", 11, 13),
    ("lunch", "midday", 11, 13),
    ("noon", "midday", 11, 13),
    ("afternoon", "afternoon", 12, 16),
    ("power hour", "closing", 15, 16),
    ("closing", "closing", 15, 16),
    ("close", "closing", 15, 16),
    ("after hours", "after-hours", 16, 20),
    ("after-hours", "after-hours", 16, 20),
    ("afterhours", "after-hours", 16, 20),
    ("evening", "after-hours", 16, 20),
    ("overnight", "night", 20, 24),
    ("night", "night", 20, 24),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub label: String,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl TimeWindow {
    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }

    fn hour(hour: u32) -> Self {
        TimeWindow {
            label: format!("{hour:02}:00"),
            start_hour: hour,
            end_hour: hour + 1,
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:02}:00-{:02}:00 UTC)",
            self.label, self.start_hour, self.end_hour
        )
    }
}

/// Constraints pulled out of a hypothesis sentence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Constraints {
    pub symbol: Option<String>,
    pub window: Option<TimeWindow>,
}

/// Best-effort extraction of a ticker and a time of day.
pub fn extract_constraints(text: &str) -> Constraints {
    Constraints {
        symbol: extract_symbol(text),
        window: extract_window(text),
    }
}

fn trim_token(token: &str) -> &str {
    token
        .trim_start_matches(|c: char| !c.is_alphanumeric() && c != '$')
        .trim_end_matches(|c: char| !c.is_alphanumeric())
}

fn extract_symbol(text: &str) -> Option<String> {
    for raw in text.split_whitespace() {
        let token = trim_token(raw);
        let (cashtag, token) = match token.strip_prefix('$') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        if token.is_empty() || token.len() > MAX_SYMBOL_LEN {
            continue;
        }
        if !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
            continue;
        }
        if !token.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            continue;
        }
        let upper = token.to_ascii_uppercase();
        if !cashtag && token != upper {
            continue;
        }
        if !cashtag && STOP_WORDS.contains(&upper.as_str()) {
            continue;
        }
        return Some(upper);
    }
    None
}

/// Position of `needle` in `haystack` as a whole word or phrase.
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric() && c != '-');
        if before_ok && after_ok {
            return Some(start);
        }
        from = end;
    }
    None
}

fn extract_window(text: &str) -> Option<TimeWindow> {
    let lower = text.to_lowercase();
    let mut best: Option<(usize, TimeWindow)> = None;

    for (keyword, label, start_hour, end_hour) in PERIODS {
        if let Some(pos) = find_word(&lower, keyword) {
            if best.as_ref().is_none_or(|(b, _)| pos < *b) {
                let window = TimeWindow {
                    label: label.to_string(),
                    start_hour: *start_hour,
                    end_hour: *end_hour,
                };
                best = Some((pos, window));
            }
        }
    }

    if let Some((pos, hour)) = explicit_hour(&lower) {
        if best.as_ref().is_none_or(|(b, _)| pos < *b) {
            best = Some((pos, TimeWindow::hour(hour)));
        }
    }

    best.map(|(_, window)| window)
}

/// First explicit hour such as `10am`, `3 pm`, `14:00` or `14h`, with its byte offset.
fn explicit_hour(lower: &str) -> Option<(usize, u32)> {
    let tokens: Vec<(usize, &str)> = lower
        .split_whitespace()
        .map(|raw| {
            let offset = raw.as_ptr() as usize - lower.as_ptr() as usize;
            (offset, trim_token(raw))
        })
        .collect();

    for (i, (offset, token)) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1).map(|(_, t)| *t);
        if let Some(hour) = parse_hour(token, next) {
            return Some((*offset, hour));
        }
    }
    None
}

fn parse_hour(token: &str, next: Option<&str>) -> Option<u32> {
    let twelve_hour = |digits: &str, suffix: &str| -> Option<u32> {
        let digits = digits.split(':').next()?;
        let h: u32 = digits.parse().ok()?;
        if !(1..=12).contains(&h) {
            return None;
        }
        match (suffix, h) {
            ("am", 12) => Some(0),
            ("am", h) => Some(h),
            ("pm", 12) => Some(12),
            ("pm", h) => Some(h + 12),
            _ => None,
        }
    };

    for suffix in ["am", "pm"] {
        if let Some(digits) = token.strip_suffix(suffix) {
            if !digits.is_empty() {
                return twelve_hour(digits, suffix);
            }
        }
    }

    if token.chars().all(|c| c.is_ascii_digit()) && !token.is_empty() {
        if let Some(suffix @ ("am" | "pm")) = next {
            return twelve_hour(token, suffix);
        }
    }

    if let Some((h, m)) = token.split_once(':') {
        let valid_minutes = m.len() == 2 && m.chars().all(|c| c.is_ascii_digit());
        let h: u32 = h.parse().ok()?;
        return (valid_minutes && h < 24).then_some(h);
    }

    if let Some(digits) = token.strip_suffix('h') {
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            let h: u32 = digits.parse().ok()?;
            return (h < 24).then_some(h);
        }
    }

    None
}

/// Verdict on a hypothesis, with the figures it rests on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisResult {
    pub supported: bool,
    pub confidence: f64,
    pub evidence: String,
    pub details: String,
    pub constraints: Constraints,
}

fn clamp_confidence(value: f64) -> f64 {
    value.clamp(10.0, 90.0)
}

fn net_pnl(trades: &[Trade]) -> f64 {
    compute_analysis(trades).net_pnl
}

fn hour_of(trade: &Trade) -> u32 {
    trade.event_time().hour()
}

/// Test a free-text hypothesis against the trade history.
///
/// Confidence reflects how much of the history the hypothesis covers, not
/// statistical significance.
pub fn check_hypothesis(trades: &[Trade], text: &str) -> HypothesisResult {
    let constraints = extract_constraints(text);

    let filtered: Vec<Trade> = match &constraints.symbol {
        Some(symbol) => trades
            .iter()
            .filter(|t| t.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
            .collect(),
        None => trades.to_vec(),
    };

    if filtered.is_empty() {
        let details = match &constraints.symbol {
            Some(symbol) => format!("No trades found for {symbol}."),
            None => "No trades recorded yet.".to_string(),
        };
        return HypothesisResult {
            supported: false,
            confidence: 0.0,
            evidence: "no matching data".to_string(),
            details,
            constraints,
        };
    }

    match (constraints.symbol.clone(), constraints.window.clone()) {
        (_, Some(window)) => {
            let (inside, outside): (Vec<Trade>, Vec<Trade>) = filtered
                .iter()
                .cloned()
                .partition(|t| window.contains(hour_of(t)));
            let pnl_in = net_pnl(&inside);
            let pnl_out = net_pnl(&outside);
            let supported = pnl_in > pnl_out;
            let confidence =
                clamp_confidence(100.0 * inside.len() as f64 / filtered.len() as f64);
            let scope = constraints
                .symbol
                .as_deref()
                .map(|s| format!("{s} trades"))
                .unwrap_or_else(|| "Trades".to_string());

            let evidence = format!(
                "{scope} during {window}: net P&L {pnl_in:.2} over {} trades. \
                 Outside that window: net P&L {pnl_out:.2} over {} trades.",
                inside.len(),
                outside.len()
            );
            let details = if supported {
                format!("Trading during {} has outperformed other times.", window.label)
            } else {
                format!("Trading during {} has not outperformed other times.", window.label)
            };
            HypothesisResult {
                supported,
                confidence,
                evidence,
                details,
                constraints,
            }
        }
        (Some(symbol), None) => {
            let analysis = compute_analysis(&filtered);
            let supported = analysis.net_pnl > 0.0;
            let confidence = clamp_confidence(100.0 * filtered.len() as f64 / 5.0);
            let evidence = format!(
                "{symbol}: net P&L {:.2} over {} trades ({} closed, win rate {:.1}%).",
                analysis.net_pnl,
                filtered.len(),
                analysis.closed_trades(),
                analysis.win_rate
            );
            let details = if supported {
                format!("{symbol} has been profitable overall.")
            } else {
                format!("{symbol} has not been profitable overall.")
            };
            HypothesisResult {
                supported,
                confidence,
                evidence,
                details,
                constraints,
            }
        }
        (None, None) => {
            let pnl = net_pnl(&filtered);
            HypothesisResult {
                supported: pnl > 0.0,
                confidence: 50.0,
                evidence: format!(
                    "All trades: net P&L {pnl:.2} over {} trades.",
                    filtered.len()
                ),
                details: "Mention a symbol or a time of day (for example 'morning' or '10am') \
                          to test a narrower hypothesis."
                    .to_string(),
                constraints,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HypothesisStatus {
    Active,
    Validated,
    Invalidated,
    Archived,
}

impl HypothesisStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(HypothesisStatus::Active),
            "VALIDATED" => Some(HypothesisStatus::Validated),
            "INVALIDATED" => Some(HypothesisStatus::Invalidated),
            "ARCHIVED" => Some(HypothesisStatus::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for HypothesisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HypothesisStatus::Active => "ACTIVE",
            HypothesisStatus::Validated => "VALIDATED",
            HypothesisStatus::Invalidated => "INVALIDATED",
            HypothesisStatus::Archived => "ARCHIVED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Judgement {
    Valid,
    Invalid,
}

impl Judgement {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "VALID" => Some(Judgement::Valid),
            "INVALID" => Some(Judgement::Invalid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub date: DateTime<Utc>,
    pub result: Judgement,
    pub notes: String,
}

/// A hypothesis the user is tracking, judged one validation at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub symbol: Option<String>,
    pub text: String,
    pub status: HypothesisStatus,
    pub validations: Vec<Validation>,
    pub consecutive_valid: u32,
    pub consecutive_invalid: u32,
    pub total_valid: u32,
    pub total_invalid: u32,
    pub created_at: DateTime<Utc>,
}

impl Hypothesis {
    pub fn new(text: &str, symbol: Option<&str>, created_at: DateTime<Utc>) -> Self {
        let symbol = symbol
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .or_else(|| extract_symbol(text));
        Hypothesis {
            id: uuid::Uuid::new_v4().to_string(),
            symbol,
            text: text.trim().to_string(),
            status: HypothesisStatus::Active,
            validations: Vec::new(),
            consecutive_valid: 0,
            consecutive_invalid: 0,
            total_valid: 0,
            total_invalid: 0,
            created_at,
        }
    }

    /// Append a judgement. Only an ACTIVE hypothesis changes status.
    pub fn record(&mut self, result: Judgement, notes: &str, date: DateTime<Utc>) {
        self.validations.push(Validation {
            date,
            result,
            notes: notes.to_string(),
        });

        match result {
            Judgement::Valid => {
                self.total_valid += 1;
                self.consecutive_valid += 1;
                self.consecutive_invalid = 0;
            }
            Judgement::Invalid => {
                self.total_invalid += 1;
                self.consecutive_invalid += 1;
                self.consecutive_valid = 0;
            }
        }

        if self.status == HypothesisStatus::Active {
            if self.consecutive_valid >= VALIDATED_AFTER {
                self.status = HypothesisStatus::Validated;
            } else if self.consecutive_invalid >= INVALIDATED_AFTER {
                self.status = HypothesisStatus::Invalidated;
            }
        }
    }

    /// Returns false if it was already archived.
    pub fn archive(&mut self) -> bool {
        if self.status == HypothesisStatus::Archived {
            return false;
        }
        self.status = HypothesisStatus::Archived;
        true
    }
}
