//! Daily price bar representation and field parsing shared by the data adapters.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::error::RsitraderError;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// True when `price` lies inside `[low, high]`.
    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a bar timestamp.
///
/// Accepts RFC 3339 (`2023-01-01T00:00:00.000Z`, converted to UTC), naive
/// `T`- or space-separated datetimes, and bare `YYYY-MM-DD` dates (midnight).
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, RsitraderError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .map_err(|_| RsitraderError::data_parse(format!("invalid timestamp '{raw}'")))
}

/// Parse a numeric or numeric-string price field.
pub fn parse_price(field: &str, raw: &str) -> Result<f64, RsitraderError> {
    let value: f64 = raw
        .trim()
        .trim_matches('"')
        .parse()
        .map_err(|e| RsitraderError::data_parse(format!("invalid {field} value '{raw}': {e}")))?;
    if !value.is_finite() {
        return Err(RsitraderError::data_parse(format!(
            "non-finite {field} value '{raw}'"
        )));
    }
    Ok(value)
}
