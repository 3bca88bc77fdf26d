//! Transaction triggers from consecutive enriched bars.
//!
//! Sell fires when the current bar's high could have pushed RSI to `sell_rsi`
//! and either the previous bar was below it (fresh cross) or the jump exceeds
//! `rsi_resell_threshold` (re-trigger). Buy mirrors this on the low side.
//! Trades fill at the previous bar's projected target.

use chrono::NaiveDateTime;

use super::backtest::BacktestConfig;
use super::oscillator::EnrichedBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub side: Side,
    pub price: f64,
    pub date: NaiveDateTime,
    pub quantity: f64,
    /// `high_rsi` (sell) or `low_rsi` (buy) of the triggering bar.
    pub trigger_rsi: f64,
    /// `rsi` of the bar before the trigger.
    pub previous_rsi: f64,
    /// Whether the fill price lies inside the triggering bar's range.
    pub within_range: bool,
}

impl Transaction {
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}

/// Evaluate the sell then buy triggers for `current` given `previous`.
pub fn evaluate(
    current: &EnrichedBar,
    previous: &EnrichedBar,
    config: &BacktestConfig,
) -> Option<Transaction> {
    if sell_triggered(current, previous, config) {
        return fill(
            Side::Sell,
            current,
            previous.sell_target,
            config.sell_size,
            current.high_rsi,
            previous.rsi,
        );
    }
    if buy_triggered(current, previous, config) {
        return fill(
            Side::Buy,
            current,
            previous.buy_target,
            config.buy_size,
            current.low_rsi,
            previous.rsi,
        );
    }
    None
}

fn sell_triggered(current: &EnrichedBar, previous: &EnrichedBar, config: &BacktestConfig) -> bool {
    current.high_rsi >= config.sell_rsi
        && (previous.rsi < config.sell_rsi
            || current.high_rsi - previous.rsi > config.rsi_resell_threshold)
}

fn buy_triggered(current: &EnrichedBar, previous: &EnrichedBar, config: &BacktestConfig) -> bool {
    current.low_rsi < config.buy_rsi
        && (previous.rsi >= config.buy_rsi
            || previous.rsi - current.low_rsi > config.rsi_rebuy_threshold)
}

fn fill(
    side: Side,
    current: &EnrichedBar,
    target: f64,
    notional: f64,
    trigger_rsi: f64,
    previous_rsi: f64,
) -> Option<Transaction> {
    if target <= 0.0 {
        tracing::warn!(
            %side,
            target,
            date = %current.bar.timestamp,
            "{side} target is not a tradable price, signal dropped"
        );
        return None;
    }

    let within_range = current.bar.contains(target);
    if !within_range {
        tracing::warn!(
            %side,
            target,
            low = current.bar.low,
            high = current.bar.high,
            date = %current.bar.timestamp,
            "{side} target outside the bar range"
        );
    }

    Some(Transaction {
        side,
        price: target,
        date: current.bar.timestamp,
        quantity: notional / target,
        trigger_rsi,
        previous_rsi,
        within_range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::Bar;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn config() -> BacktestConfig {
        BacktestConfig::default()
    }

    fn enriched(day: u32, rsi: f64, low_rsi: f64, high_rsi: f64) -> EnrichedBar {
        EnrichedBar {
            bar: Bar {
                timestamp: NaiveDate::from_ymd_opt(2024, 2, day)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                open: 100.0,
                high: 110.0,
                low: 90.0,
                close: 100.0,
            },
            rsi,
            buy_target: 95.0,
            sell_target: 105.0,
            low_rsi,
            high_rsi,
        }
    }

    #[test]
    fn no_trade_in_neutral_zone() {
        let previous = enriched(1, 50.0, 45.0, 55.0);
        let current = enriched(2, 52.0, 40.0, 60.0);
        assert!(evaluate(&current, &previous, &config()).is_none());
    }

    #[test]
    fn sell_on_fresh_cross() {
        let previous = enriched(1, 65.0, 60.0, 68.0);
        let current = enriched(2, 69.0, 60.0, 70.0);
        let tx = evaluate(&current, &previous, &config()).unwrap();
        assert_eq!(tx.side, Side::Sell);
        assert_eq!(tx.price, 105.0);
        assert_relative_eq!(tx.quantity, 2500.0 / 105.0);
        assert_eq!(tx.date, current.bar.timestamp);
        assert_eq!(tx.trigger_rsi, 70.0);
        assert_eq!(tx.previous_rsi, 65.0);
        assert!(tx.within_range);
    }

    #[test]
    fn sell_retrigger_needs_margin() {
        // Already above sell_rsi: only a jump larger than the resell threshold counts.
        let previous = enriched(1, 72.0, 70.0, 74.0);
        let small = enriched(2, 73.0, 71.0, 77.0);
        assert!(evaluate(&small, &previous, &config()).is_none());

        let large = enriched(2, 76.0, 71.0, 77.5);
        let tx = evaluate(&large, &previous, &config()).unwrap();
        assert_eq!(tx.side, Side::Sell);
    }

    #[test]
    fn buy_on_fresh_cross() {
        let previous = enriched(1, 30.0, 28.0, 33.0);
        let current = enriched(2, 31.0, 29.9, 35.0);
        let tx = evaluate(&current, &previous, &config()).unwrap();
        assert_eq!(tx.side, Side::Buy);
        assert_eq!(tx.price, 95.0);
        assert_relative_eq!(tx.quantity, 5000.0 / 95.0);
        assert_eq!(tx.trigger_rsi, 29.9);
        assert_eq!(tx.previous_rsi, 30.0);
    }

    #[test]
    fn buy_retrigger_needs_margin() {
        let previous = enriched(1, 25.0, 22.0, 27.0);
        let small = enriched(2, 24.0, 21.0, 26.0);
        assert!(evaluate(&small, &previous, &config()).is_none());

        let large = enriched(2, 22.0, 19.0, 26.0);
        let tx = evaluate(&large, &previous, &config()).unwrap();
        assert_eq!(tx.side, Side::Buy);
    }

    #[test]
    fn sell_checked_before_buy() {
        // Wide bar: high could reach the sell zone and low the buy zone.
        let previous = enriched(1, 50.0, 45.0, 55.0);
        let current = enriched(2, 50.0, 20.0, 80.0);
        let tx = evaluate(&current, &previous, &config()).unwrap();
        assert_eq!(tx.side, Side::Sell);
    }

    #[test]
    fn out_of_range_target_still_trades() {
        let mut previous = enriched(1, 65.0, 60.0, 68.0);
        previous.sell_target = 120.0;
        let current = enriched(2, 69.0, 60.0, 71.0);
        let tx = evaluate(&current, &previous, &config()).unwrap();
        assert_eq!(tx.side, Side::Sell);
        assert_eq!(tx.price, 120.0);
        assert!(!tx.within_range);
    }

    #[test]
    fn non_positive_target_is_dropped() {
        let mut previous = enriched(1, 35.0, 32.0, 40.0);
        previous.buy_target = -0.02;
        let current = enriched(2, 28.0, 20.0, 33.0);
        assert!(evaluate(&current, &previous, &config()).is_none());
    }

    #[test]
    fn uses_configured_sizes() {
        let config = BacktestConfig {
            sell_size: 1000.0,
            buy_size: 3000.0,
            ..BacktestConfig::default()
        };
        let previous = enriched(1, 35.0, 32.0, 40.0);
        let current = enriched(2, 28.0, 20.0, 33.0);
        let tx = evaluate(&current, &previous, &config).unwrap();
        assert_eq!(tx.side, Side::Buy);
        assert_relative_eq!(tx.notional(), 3000.0, epsilon = 1e-9);
    }

    #[test]
    fn side_display() {
        assert_eq!(Side::Buy.to_string(), "buy");
        assert_eq!(Side::Sell.to_string(), "sell");
    }
}
