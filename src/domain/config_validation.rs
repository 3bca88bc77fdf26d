//! Configuration validation.
//!
//! Every key is optional and falls back to the `BacktestConfig` default, but a
//! key that is present must parse and satisfy its range before a run starts.

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::RsitraderError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

/// Where price history is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Csv,
    Sqlite,
    Postgres,
}

impl FromStr for DataSource {
    type Err = RsitraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(DataSource::Csv),
            "sqlite" => Ok(DataSource::Sqlite),
            "postgres" | "postgresql" => Ok(DataSource::Postgres),
            other => Err(RsitraderError::config_invalid(
                "data",
                "source",
                format!("unknown source '{other}' (expected csv, sqlite or postgres)"),
            )),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Csv => write!(f, "csv"),
            DataSource::Sqlite => write!(f, "sqlite"),
            DataSource::Postgres => write!(f, "postgres"),
        }
    }
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), RsitraderError> {
    validate_window_size(config)?;
    validate_rsi_levels(config)?;
    validate_thresholds(config)?;
    validate_sizes(config)?;
    validate_starting_cash(config)?;
    validate_preview_bars(config)?;
    Ok(())
}

/// Validates the `[data]` section and the section of the chosen source.
/// `source_override` takes precedence over `[data] source`; csv is the default.
pub fn validate_data_config(
    config: &dyn ConfigPort,
    source_override: Option<&str>,
) -> Result<DataSource, RsitraderError> {
    let source = resolve_source(config, source_override)?;
    validate_source_keys(config, source)?;
    parse_start_date(config)?;
    validate_limit(config)?;
    Ok(source)
}

pub fn resolve_source(
    config: &dyn ConfigPort,
    source_override: Option<&str>,
) -> Result<DataSource, RsitraderError> {
    match source_override.map(str::to_string).or_else(|| config.get_string("data", "source")) {
        Some(s) => s.parse(),
        None => Ok(DataSource::Csv),
    }
}

/// `[data] start_date` as a date, or `None` when unset.
pub fn parse_start_date(config: &dyn ConfigPort) -> Result<Option<NaiveDate>, RsitraderError> {
    match config.get_string("data", "start_date") {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                RsitraderError::config_invalid(
                    "data",
                    "start_date",
                    "invalid start_date format, expected YYYY-MM-DD",
                )
            }),
    }
}

/// Reads a float key, distinguishing "absent" (default) from "unparseable".
fn number(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, RsitraderError> {
    let value = config.get_double(section, key, f64::NAN);
    if value.is_nan() {
        if config.has_key(section, key) {
            return Err(RsitraderError::config_invalid(
                section,
                key,
                format!("{key} must be a number"),
            ));
        }
        return Ok(default);
    }
    if !value.is_finite() {
        return Err(RsitraderError::config_invalid(
            section,
            key,
            format!("{key} must be finite"),
        ));
    }
    Ok(value)
}

fn integer(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, RsitraderError> {
    if !config.has_key(section, key) {
        return Ok(default);
    }
    // Probe with two defaults: a parsed value ignores both.
    let a = config.get_int(section, key, i64::MIN);
    let b = config.get_int(section, key, i64::MAX);
    if a != b {
        return Err(RsitraderError::config_invalid(
            section,
            key,
            format!("{key} must be an integer"),
        ));
    }
    Ok(a)
}

fn validate_window_size(config: &dyn ConfigPort) -> Result<(), RsitraderError> {
    let default = BacktestConfig::default().window_size as i64;
    let value = integer(config, "strategy", "window_size", default)?;
    if value < 2 {
        return Err(RsitraderError::config_invalid(
            "strategy",
            "window_size",
            "window_size must be at least 2",
        ));
    }
    Ok(())
}

fn validate_rsi_levels(config: &dyn ConfigPort) -> Result<(), RsitraderError> {
    let defaults = BacktestConfig::default();
    let buy = number(config, "strategy", "buy_rsi", defaults.buy_rsi)?;
    let sell = number(config, "strategy", "sell_rsi", defaults.sell_rsi)?;

    if buy <= 0.0 || buy >= 100.0 {
        return Err(RsitraderError::config_invalid(
            "strategy",
            "buy_rsi",
            "buy_rsi must be between 0 and 100",
        ));
    }
    if sell <= 0.0 || sell >= 100.0 {
        return Err(RsitraderError::config_invalid(
            "strategy",
            "sell_rsi",
            "sell_rsi must be between 0 and 100",
        ));
    }
    if buy >= sell {
        return Err(RsitraderError::config_invalid(
            "strategy",
            "buy_rsi",
            "buy_rsi must be below sell_rsi",
        ));
    }
    Ok(())
}

fn validate_thresholds(config: &dyn ConfigPort) -> Result<(), RsitraderError> {
    let defaults = BacktestConfig::default();
    let rebuy = number(
        config,
        "strategy",
        "rsi_rebuy_threshold",
        defaults.rsi_rebuy_threshold,
    )?;
    let resell = number(
        config,
        "strategy",
        "rsi_resell_threshold",
        defaults.rsi_resell_threshold,
    )?;

    if rebuy < 0.0 {
        return Err(RsitraderError::config_invalid(
            "strategy",
            "rsi_rebuy_threshold",
            "rsi_rebuy_threshold must be non-negative",
        ));
    }
    if resell < 0.0 {
        return Err(RsitraderError::config_invalid(
            "strategy",
            "rsi_resell_threshold",
            "rsi_resell_threshold must be non-negative",
        ));
    }

    // A rebuy margin at or above buy_rsi would leave no RSI that re-triggers.
    let buy = number(config, "strategy", "buy_rsi", defaults.buy_rsi)?;
    if buy - rebuy <= 0.0 {
        return Err(RsitraderError::config_invalid(
            "strategy",
            "rsi_rebuy_threshold",
            "rsi_rebuy_threshold must be below buy_rsi",
        ));
    }
    Ok(())
}

fn validate_sizes(config: &dyn ConfigPort) -> Result<(), RsitraderError> {
    let sell_size = number(
        config,
        "strategy",
        "sell_size",
        BacktestConfig::default().sell_size,
    )?;
    if sell_size <= 0.0 {
        return Err(RsitraderError::config_invalid(
            "strategy",
            "sell_size",
            "sell_size must be positive",
        ));
    }
    let buy_size = number(config, "strategy", "buy_size", 2.0 * sell_size)?;
    if buy_size <= 0.0 {
        return Err(RsitraderError::config_invalid(
            "strategy",
            "buy_size",
            "buy_size must be positive",
        ));
    }
    Ok(())
}

fn validate_starting_cash(config: &dyn ConfigPort) -> Result<(), RsitraderError> {
    let value = number(
        config,
        "backtest",
        "starting_cash",
        BacktestConfig::default().starting_cash,
    )?;
    if value <= 0.0 {
        return Err(RsitraderError::config_invalid(
            "backtest",
            "starting_cash",
            "starting_cash must be positive",
        ));
    }
    Ok(())
}

fn validate_preview_bars(config: &dyn ConfigPort) -> Result<(), RsitraderError> {
    if integer(config, "backtest", "preview_bars", 5)? < 0 {
        return Err(RsitraderError::config_invalid(
            "backtest",
            "preview_bars",
            "preview_bars must be non-negative",
        ));
    }
    Ok(())
}

fn validate_source_keys(config: &dyn ConfigPort, source: DataSource) -> Result<(), RsitraderError> {
    let (section, key) = match source {
        DataSource::Csv => ("csv", "path"),
        DataSource::Sqlite => ("sqlite", "path"),
        DataSource::Postgres => ("postgres", "connection_string"),
    };
    if config.get_string(section, key).is_none() {
        return Err(RsitraderError::config_missing(section, key));
    }
    if source == DataSource::Sqlite {
        let pool_size = integer(config, "sqlite", "pool_size", 4)?;
        if pool_size < 1 || pool_size > i64::from(u32::MAX) {
            return Err(RsitraderError::config_invalid(
                "sqlite",
                "pool_size",
                format!("pool_size must be between 1 and {}", u32::MAX),
            ));
        }
    }
    Ok(())
}

fn validate_limit(config: &dyn ConfigPort) -> Result<(), RsitraderError> {
    if integer(config, "data", "limit", 1000)? < 1 {
        return Err(RsitraderError::config_invalid(
            "data",
            "limit",
            "limit must be at least 1",
        ));
    }
    Ok(())
}
