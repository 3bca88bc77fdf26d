#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rsitrader::domain::backtest::BacktestConfig;
use rsitrader::domain::error::RsitraderError;
pub use rsitrader::domain::ohlcv::Bar;
use rsitrader::ports::data_port::DataPort;
use std::cell::Cell;

/// In-memory price source. Returns its bars newest first, like the warehouse
/// adapters, after applying the start date filter.
pub struct MockDataPort {
    pub bars: Vec<Bar>,
    pub error: Option<String>,
    pub calls: Cell<usize>,
}

impl MockDataPort {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            error: None,
            calls: Cell::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            bars: Vec::new(),
            error: Some(reason.to_string()),
            calls: Cell::new(0),
        }
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, start_date: Option<NaiveDate>) -> Result<Vec<Bar>, RsitraderError> {
        self.calls.set(self.calls.get() + 1);
        if let Some(reason) = &self.error {
            return Err(RsitraderError::Database {
                reason: reason.clone(),
            });
        }
        let mut bars: Vec<Bar> = self
            .bars
            .iter()
            .filter(|b| start_date.is_none_or(|start| b.timestamp.date() >= start))
            .cloned()
            .collect();
        bars.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(bars)
    }
}

pub fn day(n: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(n)
}

pub fn make_bar(n: i64, close: f64, low: f64, high: f64) -> Bar {
    Bar {
        timestamp: day(n),
        open: close,
        high,
        low,
        close,
    }
}

/// `count` bars alternating between `base` and `base + 1`, each with a
/// half-point range. The window RSI is 50 throughout.
pub fn balanced_bars(count: usize, base: f64) -> Vec<Bar> {
    (0..count as i64)
        .map(|i| {
            let c = base + (i % 2) as f64;
            make_bar(i, c, c - 0.5, c + 0.5)
        })
        .collect()
}

pub fn sample_config() -> BacktestConfig {
    BacktestConfig::default()
}

/// Alternating legs of `leg` bars falling then rising by `step`, each bar with
/// a `range` either side of its close. Drives RSI through both thresholds.
pub fn zigzag_bars(count: usize, leg: usize, step: f64, range: f64) -> Vec<Bar> {
    let mut close = 100.0;
    (0..count)
        .map(|i| {
            if (i / leg) % 2 == 1 {
                close += step;
            } else {
                close -= step;
            }
            make_bar(i as i64, close, close - range, close + range)
        })
        .collect()
}
