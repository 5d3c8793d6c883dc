//! In-memory store for tests and throwaway sessions.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::error::FolioError;
use crate::domain::hypothesis::Hypothesis;
use crate::domain::position::Position;
use crate::domain::trade::{Trade, TradeStatus};
use crate::ports::store_port::StorePort;

#[derive(Default)]
struct Tables {
    /// Insertion order doubles as "oldest first".
    trades: Vec<Trade>,
    positions: HashMap<String, Position>,
    hypotheses: Vec<Hypothesis>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, FolioError> {
        self.tables
            .read()
            .map_err(|_| FolioError::storage("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, FolioError> {
        self.tables
            .write()
            .map_err(|_| FolioError::storage("memory store lock poisoned"))
    }
}

impl StorePort for MemoryStore {
    fn save_trade(&self, trade: &Trade) -> Result<(), FolioError> {
        let mut tables = self.write()?;
        if tables.trades.iter().any(|t| t.id == trade.id) {
            return Err(FolioError::storage(format!("trade {} already exists", trade.id)));
        }
        tables.trades.push(trade.clone());
        Ok(())
    }

    fn update_trade(&self, trade: &Trade) -> Result<(), FolioError> {
        let mut tables = self.write()?;
        match tables.trades.iter_mut().find(|t| t.id == trade.id) {
            Some(existing) => {
                *existing = trade.clone();
                Ok(())
            }
            None => Err(FolioError::OrderNotFound {
                id: trade.id.clone(),
            }),
        }
    }

    fn update_open_trade(&self, trade: &Trade) -> Result<bool, FolioError> {
        let mut tables = self.write()?;
        match tables.trades.iter_mut().find(|t| t.id == trade.id) {
            Some(existing) if existing.status == TradeStatus::New => {
                *existing = trade.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(FolioError::OrderNotFound {
                id: trade.id.clone(),
            }),
        }
    }

    fn get_trade(&self, id: &str) -> Result<Option<Trade>, FolioError> {
        Ok(self.read()?.trades.iter().find(|t| t.id == id).cloned())
    }

    fn list_trades(&self) -> Result<Vec<Trade>, FolioError> {
        Ok(self.read()?.trades.clone())
    }

    fn save_position(&self, position: &Position) -> Result<(), FolioError> {
        self.write()?
            .positions
            .insert(position.symbol.clone(), position.clone());
        Ok(())
    }

    fn delete_position(&self, symbol: &str) -> Result<(), FolioError> {
        self.write()?.positions.remove(symbol);
        Ok(())
    }

    fn list_positions(&self) -> Result<Vec<Position>, FolioError> {
        let mut positions: Vec<Position> = self.read()?.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    fn save_hypothesis(&self, hypothesis: &Hypothesis) -> Result<(), FolioError> {
        let mut tables = self.write()?;
        if tables.hypotheses.iter().any(|h| h.id == hypothesis.id) {
            return Err(FolioError::storage(format!(
                "hypothesis {} already exists",
                hypothesis.id
            )));
        }
        tables.hypotheses.push(hypothesis.clone());
        Ok(())
    }

    fn update_hypothesis(&self, hypothesis: &Hypothesis) -> Result<(), FolioError> {
        let mut tables = self.write()?;
        match tables.hypotheses.iter_mut().find(|h| h.id == hypothesis.id) {
            Some(existing) => {
                *existing = hypothesis.clone();
                Ok(())
            }
            None => Err(FolioError::HypothesisNotFound {
                id: hypothesis.id.clone(),
            }),
        }
    }

    fn get_hypothesis(&self, id: &str) -> Result<Option<Hypothesis>, FolioError> {
        Ok(self.read()?.hypotheses.iter().find(|h| h.id == id).cloned())
    }

    fn list_hypotheses(&self) -> Result<Vec<Hypothesis>, FolioError> {
        Ok(self.read()?.hypotheses.clone())
    }
}
