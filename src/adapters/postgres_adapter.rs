//! PostgreSQL price warehouse adapter.

use crate::domain::error::RsitraderError;
use crate::domain::ohlcv::Bar;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{DataPort, DEFAULT_ROW_LIMIT};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use postgres::types::ToSql;
use postgres::{Client, NoTls, Row};
use std::cell::RefCell;

pub struct PostgresAdapter {
    client: RefCell<Client>,
    limit: i64,
}

/// A NULL or mistyped column is malformed data, not a query failure.
fn column_error(name: &str, err: impl std::fmt::Display) -> RsitraderError {
    RsitraderError::data_parse(format!("invalid {name} value: {err}"))
}

fn column<'a, T: postgres::types::FromSql<'a>>(
    row: &'a Row,
    idx: usize,
    name: &str,
) -> Result<T, RsitraderError> {
    row.try_get(idx).map_err(|e| column_error(name, e))
}

fn row_to_bar(row: &Row) -> Result<Bar, RsitraderError> {
    Ok(Bar {
        timestamp: column(row, 0, "time_open")?,
        open: column(row, 1, "open")?,
        high: column(row, 2, "high")?,
        low: column(row, 3, "low")?,
        close: column(row, 4, "close")?,
    })
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, RsitraderError> {
        let connection_string = config
            .get_string("postgres", "connection_string")
            .ok_or_else(|| RsitraderError::config_missing("postgres", "connection_string"))?;

        let client =
            Client::connect(&connection_string, NoTls).map_err(|e| RsitraderError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client: RefCell::new(client),
            limit: config.get_int("data", "limit", DEFAULT_ROW_LIMIT),
        })
    }
}

impl DataPort for PostgresAdapter {
    fn fetch_bars(&self, start_date: Option<NaiveDate>) -> Result<Vec<Bar>, RsitraderError> {
        let start: NaiveDateTime = start_date.unwrap_or_default().and_time(NaiveTime::MIN);

        let query = "SELECT time_open::timestamp, \
                            open::double precision, high::double precision, \
                            low::double precision, close::double precision \
                     FROM trading.price_history \
                     WHERE time_open >= $1 AND time_open < CURRENT_DATE \
                     ORDER BY time_open DESC \
                     LIMIT $2";

        let params: &[&(dyn ToSql + Sync)] = &[&start, &self.limit];
        let rows = self
            .client
            .borrow_mut()
            .query(query, params)
            .map_err(|e| RsitraderError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        rows.iter().map(row_to_bar).collect()
    }
}
