//! Configuration validation and engine settings.
//!
//! Every value is checked before the engine is built, so a typo in the INI
//! file is reported as `ConfigInvalid` instead of silently falling back to a
//! default.

use std::str::FromStr;

use crate::domain::error::FolioError;
use crate::domain::execution::ExecutionConfig;
use crate::domain::ledger::OversellPolicy;
use crate::domain::risk::RiskPolicy;
use crate::ports::config_port::ConfigPort;

/// Everything the broker needs from the `[risk]` and `[execution]` sections.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settings {
    pub risk: RiskPolicy,
    pub execution: ExecutionConfig,
    pub oversell: OversellPolicy,
}

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), FolioError> {
    validate_max_quantity(config)?;
    validate_trading_enabled(config)?;
    validate_slippage(config)?;
    validate_synthetic_pricing(config)?;
    validate_latency(config)?;
    validate_oversell_policy(config)?;
    validate_pool_size(config)?;
    Ok(())
}

/// Validate, then build the engine settings. Missing keys take their defaults.
pub fn load_settings(config: &dyn ConfigPort) -> Result<Settings, FolioError> {
    validate_config(config)?;

    let defaults = Settings::default();
    let risk = RiskPolicy {
        trading_enabled: config.get_bool("risk", "trading_enabled", defaults.risk.trading_enabled),
        max_quantity: config.get_int("risk", "max_quantity", defaults.risk.max_quantity),
        allowed_symbols: config
            .get_list("risk", "allowed_symbols")
            .into_iter()
            .map(|s| s.to_uppercase())
            .collect(),
    };
    let execution = ExecutionConfig {
        slippage_pct: config.get_double("execution", "slippage_pct", defaults.execution.slippage_pct),
        synthetic_pricing: config.get_bool(
            "execution",
            "synthetic_pricing",
            defaults.execution.synthetic_pricing,
        ),
        synthetic_price: config.get_double(
            "execution",
            "synthetic_price",
            defaults.execution.synthetic_price,
        ),
        latency_ms: config.get_int("execution", "latency_ms", 0).max(0) as u64,
    };
    let oversell = config
        .get_string("execution", "oversell_policy")
        .and_then(|v| OversellPolicy::parse(&v))
        .unwrap_or_default();

    Ok(Settings {
        risk,
        execution,
        oversell,
    })
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> FolioError {
    FolioError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// `Ok(None)` when the key is absent, an error when present but unparseable.
fn parse_value<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    expected: &str,
) -> Result<Option<T>, FolioError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("expected {expected}, got '{raw}'"))),
    }
}

fn validate_bool(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), FolioError> {
    if let Some(raw) = config.get_string(section, key) {
        let known = matches!(
            raw.trim().to_lowercase().as_str(),
            "true" | "yes" | "1" | "false" | "no" | "0"
        );
        if !known {
            return Err(invalid(section, key, format!("expected true or false, got '{raw}'")));
        }
    }
    Ok(())
}

fn validate_max_quantity(config: &dyn ConfigPort) -> Result<(), FolioError> {
    if let Some(value) = parse_value::<i64>(config, "risk", "max_quantity", "an integer")? {
        if value < 1 {
            return Err(invalid("risk", "max_quantity", "max_quantity must be at least 1"));
        }
    }
    Ok(())
}

fn validate_trading_enabled(config: &dyn ConfigPort) -> Result<(), FolioError> {
    validate_bool(config, "risk", "trading_enabled")
}

fn validate_slippage(config: &dyn ConfigPort) -> Result<(), FolioError> {
    if let Some(value) = parse_value::<f64>(config, "execution", "slippage_pct", "a number")? {
        if !value.is_finite() || !(0.0..100.0).contains(&value) {
            return Err(invalid(
                "execution",
                "slippage_pct",
                "slippage_pct must be between 0 and 100",
            ));
        }
    }
    Ok(())
}

fn validate_synthetic_pricing(config: &dyn ConfigPort) -> Result<(), FolioError> {
    validate_bool(config, "execution", "synthetic_pricing")?;
    if let Some(value) = parse_value::<f64>(config, "execution", "synthetic_price", "a number")? {
        if !value.is_finite() || value <= 0.0 {
            return Err(invalid(
                "execution",
                "synthetic_price",
                "synthetic_price must be positive",
            ));
        }
    }
    Ok(())
}

fn validate_latency(config: &dyn ConfigPort) -> Result<(), FolioError> {
    if let Some(value) = parse_value::<i64>(config, "execution", "latency_ms", "an integer")? {
        if value < 0 {
            return Err(invalid("execution", "latency_ms", "latency_ms must be non-negative"));
        }
    }
    Ok(())
}

fn validate_oversell_policy(config: &dyn ConfigPort) -> Result<(), FolioError> {
    match config.get_string("execution", "oversell_policy") {
        Some(raw) if OversellPolicy::parse(&raw).is_none() => Err(invalid(
            "execution",
            "oversell_policy",
            format!("expected clamp or reject, got '{raw}'"),
        )),
        _ => Ok(()),
    }
}

fn validate_pool_size(config: &dyn ConfigPort) -> Result<(), FolioError> {
    if let Some(value) = parse_value::<i64>(config, "sqlite", "pool_size", "an integer")? {
        if value < 1 {
            return Err(invalid("sqlite", "pool_size", "pool_size must be at least 1"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn invalid_key(err: FolioError) -> String {
        match err {
            FolioError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {:?}", other),
        }
    }

    #[test]
    fn empty_config_gives_defaults() {
        let settings = load_settings(&make_config("")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn full_config_is_loaded() {
        let config = make_config(
            r#"
[risk]
max_quantity = 500
allowed_symbols = aapl, msft
trading_enabled = yes

[execution]
slippage_pct = 0.25
synthetic_pricing = true
synthetic_price = 42.5
latency_ms = 20
oversell_policy = reject

[sqlite]
path = folio.db
pool_size = 4
"#,
        );
        let settings = load_settings(&config).unwrap();
        assert_eq!(settings.risk.max_quantity, 500);
        assert!(settings.risk.allowed_symbols.contains("AAPL"));
        assert!(settings.risk.allowed_symbols.contains("MSFT"));
        assert!(settings.risk.trading_enabled);
        assert_eq!(settings.execution.slippage_pct, 0.25);
        assert!(settings.execution.synthetic_pricing);
        assert_eq!(settings.execution.synthetic_price, 42.5);
        assert_eq!(settings.execution.latency_ms, 20);
        assert_eq!(settings.oversell, OversellPolicy::Reject);
    }

    #[test]
    fn max_quantity_must_be_positive() {
        let err = validate_config(&make_config("[risk]\nmax_quantity = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "max_quantity");
    }

    #[test]
    fn non_numeric_max_quantity_is_reported() {
        let err = validate_config(&make_config("[risk]\nmax_quantity = lots\n")).unwrap_err();
        assert_eq!(invalid_key(err), "max_quantity");
    }

    #[test]
    fn negative_slippage_fails() {
        let err = validate_config(&make_config("[execution]\nslippage_pct = -0.1\n")).unwrap_err();
        assert_eq!(invalid_key(err), "slippage_pct");
    }

    #[test]
    fn synthetic_price_must_be_positive() {
        let err =
            validate_config(&make_config("[execution]\nsynthetic_price = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "synthetic_price");
    }

    #[test]
    fn unknown_oversell_policy_fails() {
        let err =
            validate_config(&make_config("[execution]\noversell_policy = short\n")).unwrap_err();
        assert_eq!(invalid_key(err), "oversell_policy");
    }

    #[test]
    fn garbled_bool_fails() {
        let err = validate_config(&make_config("[risk]\ntrading_enabled = maybe\n")).unwrap_err();
        assert_eq!(invalid_key(err), "trading_enabled");
    }

    #[test]
    fn pool_size_must_be_positive() {
        let err = validate_config(&make_config("[sqlite]\npool_size = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "pool_size");
    }
}
