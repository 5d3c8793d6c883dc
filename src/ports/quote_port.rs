//! Price source port trait.

use crate::domain::error::FolioError;

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
}

pub trait QuotePort: Send + Sync {
    /// Latest price for `symbol`. Failures are reported as
    /// [`FolioError::UpstreamUnavailable`] and never touch engine state.
    fn quote(&self, symbol: &str) -> Result<Quote, FolioError>;
}
