//! SQLite trade ledger store.

use crate::domain::error::KabuError;
use crate::domain::ledger::{TradeRecord, TradeStatus};
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerStore;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

pub struct SqliteLedgerStore {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_error(e: r2d2::Error) -> KabuError {
    KabuError::Persistence {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> KabuError {
    KabuError::Persistence {
        reason: e.to_string(),
    }
}

/// The first row written for a (date, code) pair wins.
const INSERT: &str = "INSERT OR IGNORE INTO trade_log
    (signal_date, stock_code, stock_name, prob, threshold, future_days,
     status, buy_price, sell_price, profit, profit_rate)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

fn insert(conn: &rusqlite::Connection, r: &TradeRecord) -> Result<(), KabuError> {
    conn.execute(
        INSERT,
        params![
            r.signal_date.format("%Y-%m-%d").to_string(),
            r.stock_code,
            r.stock_name,
            r.probability,
            r.threshold,
            r.holding_period_days as i64,
            r.status.to_string(),
            r.buy_price,
            r.sell_price,
            r.profit,
            r.profit_rate,
        ],
    )
    .map_err(query_error)?;
    Ok(())
}

impl SqliteLedgerStore {
    /// Reads `[ledger] sqlite_path` and `[ledger] pool_size` (default 4).
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, KabuError> {
        let db_path = config
            .get_string("ledger", "sqlite_path")
            .ok_or_else(|| KabuError::missing("ledger", "sqlite_path"))?;
        let pool_size = config.get_int("ledger", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, KabuError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, KabuError> {
        self.pool.get().map_err(pool_error)
    }

    fn initialize_schema(&self) -> Result<(), KabuError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS trade_log (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    signal_date TEXT NOT NULL,
                    stock_code TEXT NOT NULL,
                    stock_name TEXT NOT NULL DEFAULT '',
                    prob REAL NOT NULL,
                    threshold REAL NOT NULL,
                    future_days INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    buy_price REAL NOT NULL,
                    sell_price REAL NOT NULL,
                    profit REAL NOT NULL,
                    profit_rate REAL NOT NULL,
                    UNIQUE (signal_date, stock_code)
                );",
            )
            .map_err(query_error)
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn load(&self) -> Result<Vec<TradeRecord>, KabuError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT signal_date, stock_code, stock_name, prob, threshold, future_days,
                        status, buy_price, sell_price, profit, profit_rate
                 FROM trade_log ORDER BY seq",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map([], |row| {
                let date_str: String = row.get(0)?;
                let status_str: String = row.get(6)?;
                let future_days: i64 = row.get(5)?;
                Ok((
                    date_str,
                    status_str,
                    future_days,
                    TradeRecord {
                        signal_date: NaiveDate::MIN,
                        stock_code: row.get(1)?,
                        stock_name: row.get(2)?,
                        probability: row.get(3)?,
                        threshold: row.get(4)?,
                        holding_period_days: 0,
                        status: TradeStatus::Pending,
                        buy_price: row.get(7)?,
                        sell_price: row.get(8)?,
                        profit: row.get(9)?,
                        profit_rate: row.get(10)?,
                    },
                ))
            })
            .map_err(query_error)?;

        let mut records = Vec::new();
        for row in rows {
            let (date_str, status_str, future_days, mut record) = row.map_err(query_error)?;
            record.signal_date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                KabuError::Persistence {
                    reason: format!("invalid signal_date '{}': {}", date_str, e),
                }
            })?;
            record.status = status_str
                .parse()
                .map_err(|reason| KabuError::Persistence { reason })?;
            record.holding_period_days = usize::try_from(future_days).map_err(|_| {
                KabuError::Persistence {
                    reason: format!("negative future_days {}", future_days),
                }
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn append(&mut self, record: &TradeRecord) -> Result<(), KabuError> {
        insert(&*self.conn()?, record)
    }

    fn save_all(&mut self, records: &[TradeRecord]) -> Result<(), KabuError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        tx.execute("DELETE FROM trade_log", [])
            .map_err(query_error)?;
        for record in records {
            insert(&tx, record)?;
        }
        tx.commit().map_err(query_error)
    }
}
