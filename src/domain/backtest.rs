//! Backtest orchestration.
//!
//! Slides a fixed window over the price history (oldest first), enriches each
//! window's newest bar, evaluates triggers on consecutive enriched bars and
//! folds the resulting transactions into the final portfolio.

use chrono::NaiveDate;

use super::error::RsitraderError;
use super::ohlcv::Bar;
use super::oscillator::{enrich, EnrichedBar};
use super::portfolio::Portfolio;
use super::signal::{evaluate, Side, Transaction};
use crate::ports::data_port::DataPort;

/// Strategy and accounting parameters for one backtest run.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    /// Bars per RSI window.
    pub window_size: usize,
    pub sell_rsi: f64,
    pub buy_rsi: f64,
    /// RSI margin for buying again while already below `buy_rsi`.
    pub rsi_rebuy_threshold: f64,
    /// RSI margin for selling again while already above `sell_rsi`.
    pub rsi_resell_threshold: f64,
    /// Notional per sell.
    pub sell_size: f64,
    /// Notional per buy.
    pub buy_size: f64,
    pub starting_cash: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            window_size: 15,
            sell_rsi: 70.0,
            buy_rsi: 30.0,
            rsi_rebuy_threshold: 5.0,
            rsi_resell_threshold: 5.0,
            sell_size: 2500.0,
            buy_size: 5000.0,
            starting_cash: 100_000.0,
        }
    }
}

/// Result of a backtest run.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    /// Enriched bars, oldest first.
    pub enriched: Vec<EnrichedBar>,
    /// Transactions in processing order.
    pub transactions: Vec<Transaction>,
    pub portfolio: Portfolio,
}

impl BacktestReport {
    /// Number of enriched bars, used as the run length in days.
    pub fn window_size(&self) -> usize {
        self.enriched.len()
    }

    /// Up to `n` most recent enriched bars, newest first.
    pub fn preview(&self, n: usize) -> Vec<&EnrichedBar> {
        self.enriched.iter().rev().take(n).collect()
    }

    /// Buy and sell targets projected from the newest bar.
    pub fn latest_targets(&self) -> Option<(f64, f64)> {
        self.enriched
            .last()
            .map(|bar| (bar.buy_target, bar.sell_target))
    }

    pub fn count(&self, side: Side) -> usize {
        self.transactions.iter().filter(|t| t.side == side).count()
    }

    /// Transactions whose fill price fell outside the triggering bar.
    pub fn out_of_range_count(&self) -> usize {
        self.transactions.iter().filter(|t| !t.within_range).count()
    }
}

pub struct Backtester {
    config: BacktestConfig,
}

impl Backtester {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run over `bars` in any order; they are sorted oldest first.
    pub fn run(&self, mut bars: Vec<Bar>) -> Result<BacktestReport, RsitraderError> {
        let window_size = self.config.window_size.max(1);
        if bars.len() < window_size {
            return Err(RsitraderError::InsufficientData {
                bars: bars.len(),
                minimum: window_size,
            });
        }

        bars.sort_by_key(|b| b.timestamp);

        let mut enriched: Vec<EnrichedBar> = Vec::with_capacity(bars.len() - window_size + 1);
        let mut transactions = Vec::new();

        for window in bars.windows(window_size) {
            let Some(bar) = enrich(window, &self.config) else {
                continue;
            };
            enriched.push(bar);

            if let [.., previous, current] = enriched.as_slice() {
                if let Some(tx) = evaluate(current, previous, &self.config) {
                    tracing::debug!(
                        side = %tx.side,
                        price = tx.price,
                        quantity = tx.quantity,
                        date = %tx.date,
                        "transaction"
                    );
                    transactions.push(tx);
                }
            }
        }

        let market_price = bars.last().map(|b| b.close).unwrap_or_default();
        let portfolio = Portfolio::replay(
            self.config.starting_cash,
            &transactions,
            market_price,
            enriched.len(),
        );

        Ok(BacktestReport {
            enriched,
            transactions,
            portfolio,
        })
    }
}

/// Fetch bars from `port` and run the backtest over them.
pub fn run_backtest(
    port: &dyn DataPort,
    start_date: Option<NaiveDate>,
    config: &BacktestConfig,
) -> Result<BacktestReport, RsitraderError> {
    let bars = port.fetch_bars(start_date)?;
    tracing::info!(bars = bars.len(), "fetched price history");
    Backtester::new(config.clone()).run(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDateTime;

    fn day(n: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::days(n)
    }

    fn bar(n: i64, close: f64, low: f64, high: f64) -> Bar {
        Bar {
            timestamp: day(n),
            open: close,
            high,
            low,
            close,
        }
    }

    /// 15 bars alternating 100/101 (RSI 50) followed by `last`.
    fn balanced_then(last: Bar) -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..15)
            .map(|i| {
                let c = 100.0 + (i % 2) as f64;
                bar(i, c, c - 0.5, c + 0.5)
            })
            .collect();
        bars.push(last);
        bars
    }

    #[test]
    fn default_config() {
        let c = BacktestConfig::default();
        assert_eq!(c.window_size, 15);
        assert_eq!(c.sell_rsi, 70.0);
        assert_eq!(c.buy_rsi, 30.0);
        assert_eq!(c.rsi_rebuy_threshold, 5.0);
        assert_eq!(c.rsi_resell_threshold, 5.0);
        assert_eq!(c.buy_size, 2.0 * c.sell_size);
        assert_eq!(c.starting_cash, 100_000.0);
    }

    #[test]
    fn too_few_bars_is_an_error() {
        let bars: Vec<Bar> = (0..14).map(|i| bar(i, 10.0, 9.0, 11.0)).collect();
        match Backtester::new(BacktestConfig::default()).run(bars) {
            Err(RsitraderError::InsufficientData { bars, minimum }) => {
                assert_eq!(bars, 14);
                assert_eq!(minimum, 15);
            }
            other => panic!("expected InsufficientData, got {other:?}"),
        }
    }

    #[test]
    fn exactly_one_window_enriches_one_bar_without_trading() {
        let bars: Vec<Bar> = (0..15).map(|i| bar(i, 100.0 + i as f64, 99.0, 120.0)).collect();
        let report = Backtester::new(BacktestConfig::default()).run(bars).unwrap();
        assert_eq!(report.window_size(), 1);
        assert!(report.transactions.is_empty());
        assert_eq!(report.portfolio.market_price, 114.0);
    }

    #[test]
    fn drop_through_buy_target_buys_at_projection() {
        // Previous window: RSI 50, buy target 93. Next bar dips to 85.
        let bars = balanced_then(bar(15, 90.0, 85.0, 101.0));
        let report = Backtester::new(BacktestConfig::default()).run(bars).unwrap();

        assert_eq!(report.window_size(), 2);
        assert_eq!(report.transactions.len(), 1);
        let tx = &report.transactions[0];
        assert_eq!(tx.side, Side::Buy);
        assert_eq!(tx.price, 93.0);
        assert_eq!(tx.date, day(15));
        assert!(tx.within_range);
        assert_relative_eq!(tx.quantity, 5000.0 / 93.0);
        assert_relative_eq!(tx.previous_rsi, 50.0, epsilon = 1e-9);

        let p = &report.portfolio;
        assert_relative_eq!(p.cash, 95_000.0, epsilon = 1e-6);
        assert_relative_eq!(p.mean_price, 93.0, epsilon = 1e-9);
        assert_eq!(p.market_price, 90.0);
        // (90 - 93) * 53.763...
        assert_eq!(p.mtm, -161.29);
        assert_relative_eq!(p.pnl, -161.29, epsilon = 1e-6);
    }

    #[test]
    fn spike_through_sell_target_without_position_is_skipped() {
        // Previous window: sell target 110.33. High of 115 crosses it.
        let bars = balanced_then(bar(15, 110.0, 99.5, 115.0));
        let report = Backtester::new(BacktestConfig::default()).run(bars).unwrap();

        assert_eq!(report.transactions.len(), 1);
        let tx = &report.transactions[0];
        assert_eq!(tx.side, Side::Sell);
        assert_eq!(tx.price, 110.33);
        assert!(tx.within_range);

        // Nothing to sell: the ledger leaves cash and position alone.
        assert_eq!(report.portfolio.cash, 100_000.0);
        assert_eq!(report.portfolio.position, 0.0);
        assert_eq!(report.portfolio.pnl, 0.0);
    }

    #[test]
    fn input_order_does_not_matter() {
        let oldest_first = balanced_then(bar(15, 90.0, 85.0, 101.0));
        let mut newest_first = oldest_first.clone();
        newest_first.reverse();

        let backtester = Backtester::new(BacktestConfig::default());
        let a = backtester.run(oldest_first).unwrap();
        let b = backtester.run(newest_first).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn preview_is_newest_first_and_truncated() {
        let bars: Vec<Bar> = (0..20)
            .map(|i| bar(i, 50.0 + (i % 3) as f64, 48.0, 53.0))
            .collect();
        let report = Backtester::new(BacktestConfig::default()).run(bars).unwrap();
        assert_eq!(report.window_size(), 6);

        let preview = report.preview(5);
        assert_eq!(preview.len(), 5);
        assert_eq!(preview[0].bar.timestamp, day(19));
        assert_eq!(preview[4].bar.timestamp, day(15));
        assert_eq!(report.preview(50).len(), 6);
    }

    #[test]
    fn latest_targets_come_from_newest_bar() {
        let bars = balanced_then(bar(15, 100.0, 99.5, 100.5));
        let report = Backtester::new(BacktestConfig::default()).run(bars).unwrap();
        let newest = report.enriched.last().unwrap();
        assert_eq!(
            report.latest_targets(),
            Some((newest.buy_target, newest.sell_target))
        );
    }

    #[test]
    fn report_counts() {
        let bars = balanced_then(bar(15, 90.0, 85.0, 101.0));
        let report = Backtester::new(BacktestConfig::default()).run(bars).unwrap();
        assert_eq!(report.count(Side::Buy), 1);
        assert_eq!(report.count(Side::Sell), 0);
        assert_eq!(report.out_of_range_count(), 0);
    }
}
