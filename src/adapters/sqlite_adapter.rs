//! SQLite price warehouse adapter.
//!
//! Reads the `price_history` table newest first, restricted to bars opened
//! before today and capped at a row limit.

use crate::domain::error::RsitraderError;
use crate::domain::ohlcv::{parse_price, parse_timestamp, Bar};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{DataPort, DEFAULT_ROW_LIMIT};
use chrono::{NaiveDate, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use rusqlite::types::Value;

const PRICE_QUERY: &str = "SELECT time_open, open, high, low, close
     FROM price_history
     WHERE time_open >= ?1 AND time_open < ?2
     ORDER BY time_open DESC
     LIMIT ?3";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
    limit: i64,
}

fn pool_error(e: r2d2::Error) -> RsitraderError {
    RsitraderError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> RsitraderError {
    RsitraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

/// A raw column value as stored; numeric columns may hold text.
fn value_to_f64(name: &str, value: Value) -> Result<f64, RsitraderError> {
    match value {
        Value::Real(v) => Ok(v),
        Value::Integer(v) => Ok(v as f64),
        Value::Text(s) => parse_price(name, &s),
        other => Err(RsitraderError::data_parse(format!(
            "unexpected {name} value {other:?}"
        ))),
    }
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, RsitraderError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| RsitraderError::config_missing("sqlite", "path"))?;

        let pool_size = u32::try_from(config.get_int("sqlite", "pool_size", 4))
            .ok()
            .filter(|&n| n >= 1)
            .ok_or_else(|| {
                RsitraderError::config_invalid(
                    "sqlite",
                    "pool_size",
                    format!("pool_size must be between 1 and {}", u32::MAX),
                )
            })?;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self {
            pool,
            limit: config.get_int("data", "limit", DEFAULT_ROW_LIMIT),
        })
    }

    pub fn in_memory() -> Result<Self, RsitraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self {
            pool,
            limit: DEFAULT_ROW_LIMIT,
        })
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn initialize_schema(&self) -> Result<(), RsitraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS price_history (
                time_open TEXT NOT NULL PRIMARY KEY,
                time_close TEXT,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL
            );",
        )
        .map_err(query_error)?;

        Ok(())
    }

    pub fn insert_bars(&self, bars: &[Bar]) -> Result<(), RsitraderError> {
        let mut conn = self.pool.get().map_err(pool_error)?;
        let tx = conn.transaction().map_err(query_error)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO price_history (time_open, open, high, low, close)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    bar.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(())
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_bars(&self, start_date: Option<NaiveDate>) -> Result<Vec<Bar>, RsitraderError> {
        let conn = self.pool.get().map_err(pool_error)?;

        let start = start_date.unwrap_or_default().format("%Y-%m-%d").to_string();
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();

        let mut stmt = conn.prepare(PRICE_QUERY).map_err(query_error)?;
        let rows = stmt
            .query_map(params![start, today, self.limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Value>(1)?,
                    row.get::<_, Value>(2)?,
                    row.get::<_, Value>(3)?,
                    row.get::<_, Value>(4)?,
                ))
            })
            .map_err(query_error)?;

        let mut bars = Vec::new();
        for row in rows {
            let (time_open, open, high, low, close) = row.map_err(query_error)?;
            bars.push(Bar {
                timestamp: parse_timestamp(&time_open)?,
                open: value_to_f64("open", open)?,
                high: value_to_f64("high", high)?,
                low: value_to_f64("low", low)?,
                close: value_to_f64("close", close)?,
            });
        }

        Ok(bars)
    }
}
