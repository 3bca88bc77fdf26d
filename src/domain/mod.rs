//! Core domain types and logic.

pub mod ohlcv;
pub mod oscillator;
pub mod signal;
pub mod portfolio;
pub mod backtest;
pub mod config_validation;
pub mod error;
