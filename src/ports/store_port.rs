//! Persistence port trait.
//!
//! Only single-record writes are guaranteed. The engine tolerates a trade
//! being saved while the matching position write fails; the next sync
//! rewrites positions from the live ledger.

use crate::domain::error::FolioError;
use crate::domain::hypothesis::Hypothesis;
use crate::domain::position::Position;
use crate::domain::trade::Trade;

pub trait StorePort: Send + Sync {
    fn save_trade(&self, trade: &Trade) -> Result<(), FolioError>;
    fn update_trade(&self, trade: &Trade) -> Result<(), FolioError>;
    /// Write `trade` only if the stored row is still NEW, as one atomic step.
    /// `Ok(false)` means another request settled it first.
    fn update_open_trade(&self, trade: &Trade) -> Result<bool, FolioError>;
    fn get_trade(&self, id: &str) -> Result<Option<Trade>, FolioError>;
    /// All trades, oldest first.
    fn list_trades(&self) -> Result<Vec<Trade>, FolioError>;

    fn save_position(&self, position: &Position) -> Result<(), FolioError>;
    fn delete_position(&self, symbol: &str) -> Result<(), FolioError>;
    fn list_positions(&self) -> Result<Vec<Position>, FolioError>;

    fn save_hypothesis(&self, hypothesis: &Hypothesis) -> Result<(), FolioError>;
    fn update_hypothesis(&self, hypothesis: &Hypothesis) -> Result<(), FolioError>;
    fn get_hypothesis(&self, id: &str) -> Result<Option<Hypothesis>, FolioError>;
    fn list_hypotheses(&self) -> Result<Vec<Hypothesis>, FolioError>;
}
