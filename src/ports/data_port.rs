//! Price source port.

use crate::domain::error::RsitraderError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;

/// Default cap on rows returned by a warehouse query.
pub const DEFAULT_ROW_LIMIT: i64 = 1000;

/// A source of daily bars for a single instrument.
///
/// Implementations return bars in their native order (warehouse queries are
/// newest first); the backtest normalizes ordering itself.
pub trait DataPort {
    /// Fetch bars opened on or after `start_date` (all bars when `None`).
    fn fetch_bars(&self, start_date: Option<NaiveDate>) -> Result<Vec<Bar>, RsitraderError>;
}
