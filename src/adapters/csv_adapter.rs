//! Delimited price history file adapter.
//!
//! Reads a header-led file (semicolon separated by default) and locates the
//! `timeOpen`, `open`, `high`, `low` and `close` columns by name, so exports
//! with extra columns (`timeClose`, `volume`, `marketCap`, ...) load as-is.

use crate::domain::error::RsitraderError;
use crate::domain::ohlcv::{parse_price, parse_timestamp, Bar};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::PathBuf;

pub const TIMESTAMP_COLUMN: &str = "timeOpen";
const PRICE_COLUMNS: [&str; 4] = ["open", "high", "low", "close"];

pub struct CsvAdapter {
    path: PathBuf,
    delimiter: u8,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            delimiter: b';',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, RsitraderError> {
        let path = config
            .get_string("csv", "path")
            .ok_or_else(|| RsitraderError::config_missing("csv", "path"))?;

        let adapter = Self::new(PathBuf::from(path));
        match config.get_string("csv", "delimiter") {
            Some(d) => Ok(adapter.with_delimiter(parse_delimiter(&d)?)),
            None => Ok(adapter),
        }
    }
}

/// A single-byte delimiter, or one of the names `semicolon`, `comma`, `tab`
/// (`;` starts an INI comment, so the name is the portable spelling).
pub fn parse_delimiter(raw: &str) -> Result<u8, RsitraderError> {
    let raw = raw.trim();
    match raw {
        "semicolon" => Ok(b';'),
        "comma" => Ok(b','),
        "tab" | "\\t" => Ok(b'\t'),
        _ if raw.len() == 1 => Ok(raw.as_bytes()[0]),
        _ => Err(RsitraderError::config_invalid(
            "csv",
            "delimiter",
            format!("expected a single character, got '{raw}'"),
        )),
    }
}

struct ColumnIndex {
    timestamp: usize,
    prices: [usize; 4],
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Result<Self, RsitraderError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| RsitraderError::data_parse(format!("missing {name} column")))
        };

        let timestamp = find(TIMESTAMP_COLUMN)?;
        let mut prices = [0usize; 4];
        for (slot, name) in prices.iter_mut().zip(PRICE_COLUMNS) {
            *slot = find(name)?;
        }
        Ok(Self { timestamp, prices })
    }
}

fn field<'r>(
    record: &'r StringRecord,
    idx: usize,
    name: &str,
    line: u64,
) -> Result<&'r str, RsitraderError> {
    record
        .get(idx)
        .ok_or_else(|| RsitraderError::data_parse(format!("line {line}: missing {name} value")))
}

/// Prefix a parse failure's reason with its line number.
fn at_line(line: u64, err: RsitraderError) -> RsitraderError {
    match err {
        RsitraderError::DataParse { reason } => {
            RsitraderError::data_parse(format!("line {line}: {reason}"))
        }
        other => other,
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, start_date: Option<NaiveDate>) -> Result<Vec<Bar>, RsitraderError> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .from_path(&self.path)
            .map_err(|e| {
                RsitraderError::data_parse(format!("failed to read {}: {e}", self.path.display()))
            })?;

        let headers = rdr
            .headers()
            .map_err(|e| RsitraderError::data_parse(format!("CSV header error: {e}")))?
            .clone();
        let columns = ColumnIndex::from_headers(&headers)?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record =
                result.map_err(|e| RsitraderError::data_parse(format!("CSV parse error: {e}")))?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();

            let raw_ts = field(&record, columns.timestamp, TIMESTAMP_COLUMN, line)?;
            let timestamp = parse_timestamp(raw_ts).map_err(|e| at_line(line, e))?;

            if start_date.is_some_and(|start| timestamp.date() < start) {
                continue;
            }

            let mut prices = [0.0f64; 4];
            for ((value, idx), name) in prices.iter_mut().zip(columns.prices).zip(PRICE_COLUMNS) {
                let raw = field(&record, idx, name, line)?;
                *value = parse_price(name, raw).map_err(|e| at_line(line, e))?;
            }
            let [open, high, low, close] = prices;

            bars.push(Bar {
                timestamp,
                open,
                high,
                low,
                close,
            });
        }

        Ok(bars)
    }
}
