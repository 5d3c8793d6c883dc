//! Domain error types.

use super::trade::TradeStatus;

/// Top-level error type for folio.
#[derive(Debug, thiserror::Error)]
pub enum FolioError {
    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("order rejected: {reason}")]
    RiskRejected { reason: String },

    #[error("order {id} is {status} and cannot be cancelled")]
    NotCancellable { id: String, status: TradeStatus },

    #[error("order {id} not found")]
    OrderNotFound { id: String },

    #[error("order {id} was settled by another request")]
    OrderConflict { id: String },

    #[error("price source unavailable for {symbol}: {reason}")]
    UpstreamUnavailable { symbol: String, reason: String },

    #[error("hypothesis {id} not found")]
    HypothesisNotFound { id: String },

    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FolioError {
    pub fn invalid_order(reason: impl Into<String>) -> Self {
        FolioError::InvalidOrder {
            reason: reason.into(),
        }
    }

    pub fn risk_rejected(reason: impl Into<String>) -> Self {
        FolioError::RiskRejected {
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl ToString) -> Self {
        FolioError::Storage {
            reason: reason.to_string(),
        }
    }

    /// Message safe to show an end user. Storage and I/O details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            FolioError::Storage { .. } | FolioError::Io(_) => {
                "the trade journal could not be read or written; try again".to_string()
            }
            FolioError::UpstreamUnavailable { symbol, .. } => {
                format!("no live price is available for {symbol} right now")
            }
            other => other.to_string(),
        }
    }
}

impl FolioError {
    /// Process exit status for this error.
    pub fn exit_status(&self) -> u8 {
        match self {
            FolioError::Io(_) => 1,
            FolioError::ConfigParse { .. }
            | FolioError::ConfigMissing { .. }
            | FolioError::ConfigInvalid { .. } => 2,
            FolioError::Storage { .. } => 3,
            FolioError::InvalidOrder { .. }
            | FolioError::RiskRejected { .. }
            | FolioError::NotCancellable { .. }
            | FolioError::OrderConflict { .. } => 4,
            FolioError::UpstreamUnavailable { .. } => 5,
            FolioError::OrderNotFound { .. } | FolioError::HypothesisNotFound { .. } => 6,
        }
    }
}

impl From<&FolioError> for std::process::ExitCode {
    fn from(err: &FolioError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
