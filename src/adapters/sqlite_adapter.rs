//! SQLite trade journal.
//!
//! Timestamps are stored as RFC 3339 text and hypothesis validations as a
//! JSON array. Rows come back in insertion order.

use crate::domain::error::FolioError;
use crate::domain::hypothesis::{Hypothesis, HypothesisStatus, Validation};
use crate::domain::order::{OrderType, Side, TimeInForce};
use crate::domain::position::Position;
use crate::domain::trade::{Fill, FillPrice, Trade, TradeStatus};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::StorePort;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

const TRADE_COLUMNS: &str = "id, symbol, side, order_type, status, quantity, price, limit_price,
     time_in_force, created_at, fill_quantity, fill_price, fill_source, filled_at, notes";

const HYPOTHESIS_COLUMNS: &str = "id, symbol, text, status, validations, consecutive_valid,
     consecutive_invalid, total_valid, total_invalid, created_at";

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FolioError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| FolioError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(FolioError::storage)?;

        Ok(Self { pool })
    }

    /// Each pooled connection to `:memory:` is its own database, so the pool
    /// holds exactly one.
    pub fn in_memory() -> Result<Self, FolioError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(FolioError::storage)?;

        Ok(Self { pool })
    }

    /// Overwrite the mutable columns of a trade row. `guard` is appended to the
    /// WHERE clause. Returns the number of rows changed.
    fn rewrite_trade(&self, trade: &Trade, guard: &str) -> Result<usize, FolioError> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "UPDATE trades SET status = ?2, price = ?3, created_at = ?4, fill_quantity = ?5,
                     fill_price = ?6, fill_source = ?7, filled_at = ?8, notes = ?9
                 WHERE id = ?1{guard}"
            ),
            params![
                trade.id,
                trade.status.to_string(),
                trade.price,
                trade.created_at.to_rfc3339(),
                trade.fill.map(|f| f.quantity),
                trade.fill.map(|f| f.price.value()),
                trade.fill.map(|f| f.price.source()),
                trade.fill.map(|f| f.filled_at.to_rfc3339()),
                trade.notes,
            ],
        )
        .map_err(FolioError::storage)
    }

    pub fn initialize_schema(&self) -> Result<(), FolioError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                order_type TEXT NOT NULL,
                status TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price REAL NOT NULL,
                limit_price REAL,
                time_in_force TEXT NOT NULL,
                created_at TEXT NOT NULL,
                fill_quantity INTEGER,
                fill_price REAL,
                fill_source TEXT,
                filled_at TEXT,
                notes TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol);
            CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status);
            CREATE TABLE IF NOT EXISTS positions (
                symbol TEXT PRIMARY KEY,
                quantity INTEGER NOT NULL,
                average_cost REAL NOT NULL,
                current_price REAL
            );
            CREATE TABLE IF NOT EXISTS hypotheses (
                id TEXT PRIMARY KEY,
                symbol TEXT,
                text TEXT NOT NULL,
                status TEXT NOT NULL,
                validations TEXT NOT NULL,
                consecutive_valid INTEGER NOT NULL,
                consecutive_invalid INTEGER NOT NULL,
                total_valid INTEGER NOT NULL,
                total_invalid INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );",
        )
        .map_err(FolioError::storage)?;

        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, FolioError> {
        self.pool.get().map_err(FolioError::storage)
    }
}

fn conversion_error(column: usize, reason: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, reason.into())
}

fn timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, format!("invalid timestamp '{raw}': {e}")))
}

fn parsed<T>(column: usize, raw: &str, parse: impl Fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| conversion_error(column, format!("unknown value '{raw}'")))
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    let side: String = row.get(2)?;
    let order_type: String = row.get(3)?;
    let status: String = row.get(4)?;
    let time_in_force: String = row.get(8)?;
    let created_at: String = row.get(9)?;

    let fill_quantity: Option<i64> = row.get(10)?;
    let fill_price: Option<f64> = row.get(11)?;
    let fill_source: Option<String> = row.get(12)?;
    let filled_at: Option<String> = row.get(13)?;
    let fill = match (fill_quantity, fill_price, fill_source, filled_at) {
        (Some(quantity), Some(price), Some(source), Some(at)) => Some(Fill {
            quantity,
            price: parsed(12, &source, |s| FillPrice::from_parts(s, price))?,
            filled_at: timestamp(13, &at)?,
        }),
        _ => None,
    };

    Ok(Trade {
        id: row.get(0)?,
        symbol: row.get(1)?,
        side: parsed(2, &side, Side::parse)?,
        order_type: parsed(3, &order_type, OrderType::parse)?,
        status: parsed(4, &status, TradeStatus::parse)?,
        quantity: row.get(5)?,
        price: row.get(6)?,
        limit_price: row.get(7)?,
        time_in_force: parsed(8, &time_in_force, TimeInForce::parse)?,
        created_at: timestamp(9, &created_at)?,
        fill,
        notes: row.get(14)?,
    })
}

fn hypothesis_from_row(row: &Row<'_>) -> rusqlite::Result<Hypothesis> {
    let status: String = row.get(3)?;
    let validations: String = row.get(4)?;
    let created_at: String = row.get(9)?;
    let validations: Vec<Validation> = serde_json::from_str(&validations)
        .map_err(|e| conversion_error(4, format!("invalid validations: {e}")))?;

    Ok(Hypothesis {
        id: row.get(0)?,
        symbol: row.get(1)?,
        text: row.get(2)?,
        status: parsed(3, &status, HypothesisStatus::parse)?,
        validations,
        consecutive_valid: row.get(5)?,
        consecutive_invalid: row.get(6)?,
        total_valid: row.get(7)?,
        total_invalid: row.get(8)?,
        created_at: timestamp(9, &created_at)?,
    })
}

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<Position> {
    Ok(Position {
        symbol: row.get(0)?,
        quantity: row.get(1)?,
        average_cost: row.get(2)?,
        current_price: row.get(3)?,
    })
}

fn validations_json(hypothesis: &Hypothesis) -> Result<String, FolioError> {
    serde_json::to_string(&hypothesis.validations).map_err(FolioError::storage)
}

impl StorePort for SqliteStore {
    fn save_trade(&self, trade: &Trade) -> Result<(), FolioError> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO trades ({TRADE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            params![
                trade.id,
                trade.symbol,
                trade.side.to_string(),
                trade.order_type.to_string(),
                trade.status.to_string(),
                trade.quantity,
                trade.price,
                trade.limit_price,
                trade.time_in_force.to_string(),
                trade.created_at.to_rfc3339(),
                trade.fill.map(|f| f.quantity),
                trade.fill.map(|f| f.price.value()),
                trade.fill.map(|f| f.price.source()),
                trade.fill.map(|f| f.filled_at.to_rfc3339()),
                trade.notes,
            ],
        )
        .map_err(FolioError::storage)?;
        Ok(())
    }

    fn update_trade(&self, trade: &Trade) -> Result<(), FolioError> {
        if self.rewrite_trade(trade, "")? == 0 {
            return Err(FolioError::OrderNotFound {
                id: trade.id.clone(),
            });
        }
        Ok(())
    }

    fn update_open_trade(&self, trade: &Trade) -> Result<bool, FolioError> {
        if self.rewrite_trade(trade, " AND status = 'NEW'")? == 1 {
            return Ok(true);
        }
        match self.get_trade(&trade.id)? {
            Some(_) => Ok(false),
            None => Err(FolioError::OrderNotFound {
                id: trade.id.clone(),
            }),
        }
    }

    fn get_trade(&self, id: &str) -> Result<Option<Trade>, FolioError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1"),
            params![id],
            trade_from_row,
        )
        .optional()
        .map_err(FolioError::storage)
    }

    fn list_trades(&self) -> Result<Vec<Trade>, FolioError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {TRADE_COLUMNS} FROM trades ORDER BY rowid ASC"))
            .map_err(FolioError::storage)?;
        let rows = stmt
            .query_map([], trade_from_row)
            .map_err(FolioError::storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(FolioError::storage)
    }

    fn save_position(&self, position: &Position) -> Result<(), FolioError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO positions (symbol, quantity, average_cost, current_price)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                position.symbol,
                position.quantity,
                position.average_cost,
                position.current_price
            ],
        )
        .map_err(FolioError::storage)?;
        Ok(())
    }

    fn delete_position(&self, symbol: &str) -> Result<(), FolioError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM positions WHERE symbol = ?1", params![symbol])
            .map_err(FolioError::storage)?;
        Ok(())
    }

    fn list_positions(&self) -> Result<Vec<Position>, FolioError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, quantity, average_cost, current_price
                 FROM positions ORDER BY symbol",
            )
            .map_err(FolioError::storage)?;
        let rows = stmt
            .query_map([], position_from_row)
            .map_err(FolioError::storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(FolioError::storage)
    }

    fn save_hypothesis(&self, hypothesis: &Hypothesis) -> Result<(), FolioError> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO hypotheses ({HYPOTHESIS_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                hypothesis.id,
                hypothesis.symbol,
                hypothesis.text,
                hypothesis.status.to_string(),
                validations_json(hypothesis)?,
                hypothesis.consecutive_valid,
                hypothesis.consecutive_invalid,
                hypothesis.total_valid,
                hypothesis.total_invalid,
                hypothesis.created_at.to_rfc3339(),
            ],
        )
        .map_err(FolioError::storage)?;
        Ok(())
    }

    fn update_hypothesis(&self, hypothesis: &Hypothesis) -> Result<(), FolioError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE hypotheses SET status = ?2, validations = ?3, consecutive_valid = ?4,
                     consecutive_invalid = ?5, total_valid = ?6, total_invalid = ?7
                 WHERE id = ?1",
                params![
                    hypothesis.id,
                    hypothesis.status.to_string(),
                    validations_json(hypothesis)?,
                    hypothesis.consecutive_valid,
                    hypothesis.consecutive_invalid,
                    hypothesis.total_valid,
                    hypothesis.total_invalid,
                ],
            )
            .map_err(FolioError::storage)?;
        if changed == 0 {
            return Err(FolioError::HypothesisNotFound {
                id: hypothesis.id.clone(),
            });
        }
        Ok(())
    }

    fn get_hypothesis(&self, id: &str) -> Result<Option<Hypothesis>, FolioError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {HYPOTHESIS_COLUMNS} FROM hypotheses WHERE id = ?1"),
            params![id],
            hypothesis_from_row,
        )
        .optional()
        .map_err(FolioError::storage)
    }

    fn list_hypotheses(&self) -> Result<Vec<Hypothesis>, FolioError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {HYPOTHESIS_COLUMNS} FROM hypotheses ORDER BY rowid ASC"
            ))
            .map_err(FolioError::storage)?;
        let rows = stmt
            .query_map([], hypothesis_from_row)
            .map_err(FolioError::storage)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(FolioError::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::hypothesis::Judgement;
    use crate::domain::order::{Order, OrderKind};
    use chrono::TimeZone;

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize_schema().unwrap();
        store
    }

    fn limit_trade() -> Trade {
        let order = Order {
            symbol: "AAPL".into(),
            side: Side::Buy,
            quantity: 10,
            kind: OrderKind::Limit { limit_price: 100.0 },
            time_in_force: TimeInForce::Gtc,
        };
        Trade::open(&order, 105.0, Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap())
    }

    #[test]
    fn from_config_missing_path() {
        let config = FileConfigAdapter::empty();
        match SqliteStore::from_config(&config) {
            Err(FolioError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let store = store();
        store.initialize_schema().unwrap();
    }

    #[test]
    fn pending_trade_is_stored_without_fill() {
        let store = store();
        let trade = limit_trade();
        store.save_trade(&trade).unwrap();
        let loaded = store.get_trade(&trade.id).unwrap().unwrap();
        assert_eq!(loaded, trade);
        assert!(loaded.fill.is_none());
        assert_eq!(loaded.limit_price, Some(100.0));
    }

    #[test]
    fn filled_trade_update_keeps_price_source() {
        let store = store();
        let mut trade = limit_trade();
        store.save_trade(&trade).unwrap();

        let at = Utc.with_ymd_and_hms(2024, 3, 4, 15, 30, 0).unwrap();
        trade.fill_completely(FillPrice::Synthetic(99.5), at).unwrap();
        trade.notes = Some("filled at synthetic price".into());
        store.update_trade(&trade).unwrap();

        let loaded = store.get_trade(&trade.id).unwrap().unwrap();
        assert_eq!(loaded.status, TradeStatus::Filled);
        assert_eq!(loaded.fill.unwrap().price, FillPrice::Synthetic(99.5));
        assert_eq!(loaded.filled_at(), Some(at));
        assert_eq!(loaded, trade);
    }

    #[test]
    fn open_trade_update_refuses_settled_rows() {
        let store = store();
        let trade = limit_trade();
        store.save_trade(&trade).unwrap();

        let mut cancelled = trade.clone();
        cancelled.cancel().unwrap();
        assert!(store.update_open_trade(&cancelled).unwrap());

        let mut filled = trade.clone();
        filled
            .fill_completely(FillPrice::Quoted(99.0), Utc::now())
            .unwrap();
        assert!(!store.update_open_trade(&filled).unwrap());
        assert_eq!(
            store.get_trade(&trade.id).unwrap().unwrap().status,
            TradeStatus::Cancelled
        );

        let mut missing = limit_trade();
        missing.cancel().unwrap();
        assert!(matches!(
            store.update_open_trade(&missing),
            Err(FolioError::OrderNotFound { .. })
        ));
    }

    #[test]
    fn unknown_ids() {
        let store = store();
        assert!(store.get_trade("missing").unwrap().is_none());
        assert!(matches!(
            store.update_trade(&limit_trade()),
            Err(FolioError::OrderNotFound { .. })
        ));
        assert!(store.get_hypothesis("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_trade_is_storage_error() {
        let store = store();
        let trade = limit_trade();
        store.save_trade(&trade).unwrap();
        assert!(matches!(
            store.save_trade(&trade),
            Err(FolioError::Storage { .. })
        ));
    }

    #[test]
    fn trades_list_in_insertion_order() {
        let store = store();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Trade::manual("MSFT", Side::Buy, 1, 10.0, at + chrono::Duration::days(1));
        let earlier = Trade::manual("AAPL", Side::Buy, 1, 10.0, at);
        store.save_trade(&later).unwrap();
        store.save_trade(&earlier).unwrap();
        let ids: Vec<String> = store.list_trades().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![later.id, earlier.id]);
    }

    #[test]
    fn positions_upsert_and_delete() {
        let store = store();
        let mut pos = Position::open("AAPL", 10, 100.0);
        store.save_position(&pos).unwrap();
        pos.buy(10, 120.0);
        pos.mark(125.0);
        store.save_position(&pos).unwrap();

        let positions = store.list_positions().unwrap();
        assert_eq!(positions, vec![pos]);

        store.delete_position("AAPL").unwrap();
        assert!(store.list_positions().unwrap().is_empty());
    }

    #[test]
    fn hypothesis_validations_round_trip_as_json() {
        let store = store();
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut h = Hypothesis::new("TSLA fades in the afternoon", None, created);
        store.save_hypothesis(&h).unwrap();

        h.record(Judgement::Valid, "faded again", created + chrono::Duration::days(1));
        h.record(Judgement::Invalid, "ripped", created + chrono::Duration::days(2));
        store.update_hypothesis(&h).unwrap();

        let loaded = store.get_hypothesis(&h.id).unwrap().unwrap();
        assert_eq!(loaded, h);
        assert_eq!(store.list_hypotheses().unwrap().len(), 1);
    }
}
