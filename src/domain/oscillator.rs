//! Fixed-window RSI with price-target inversion.
//!
//! Windows are chronological: oldest bar first, newest bar last.
//!
//! RSI over a window of W closes (W-1 differences):
//! - A strictly positive difference is a gain; anything else is a loss.
//! - avg_gain = gains / (W-1), avg_loss = losses / (W-1)
//! - RSI = 100 - (100 / (1 + avg_gain / avg_loss)); RSI = 100 if avg_loss == 0
//! - Fewer than 2 closes: RSI = 0
//!
//! Targets project the next close that would move RSI to the configured
//! thresholds, using the gain/loss sums without the oldest difference (which
//! drops out of the window on the next bar):
//! - target_loss = max(0, gain_wo * sell/buy - loss_wo)
//! - target_gain = max(0, loss_wo * sell/buy - gain_wo)
//!
//! where `sell/buy` is the ratio of the (re-trigger adjusted) target RSI
//! levels. The two thresholds are coupled through that single ratio.

use super::backtest::BacktestConfig;
use super::ohlcv::Bar;

/// RSI and the buy/sell targets derived from the same window sums.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsiReading {
    pub rsi: f64,
    pub buy_target: f64,
    pub sell_target: f64,
}

/// A bar enriched with oscillator output for the window it closes.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedBar {
    pub bar: Bar,
    pub rsi: f64,
    pub buy_target: f64,
    pub sell_target: f64,
    /// RSI with the bar's low in place of its close.
    pub low_rsi: f64,
    /// RSI with the bar's high in place of its close.
    pub high_rsi: f64,
}

/// Round half away from zero to 2 decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute RSI and price targets for a chronological window of closes.
pub fn compute_rsi(closes: &[f64], config: &BacktestConfig) -> RsiReading {
    let Some(&newest) = closes.last() else {
        return RsiReading {
            rsi: 0.0,
            buy_target: 0.0,
            sell_target: 0.0,
        };
    };
    if closes.len() < 2 {
        let price = round2(newest);
        return RsiReading {
            rsi: 0.0,
            buy_target: price,
            sell_target: price,
        };
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    let mut oldest_gain = 0.0;
    let mut oldest_loss = 0.0;

    for (i, pair) in closes.windows(2).enumerate() {
        let diff = pair[1] - pair[0];
        if diff > 0.0 {
            gains += diff;
            if i == 0 {
                oldest_gain = diff;
            }
        } else {
            losses -= diff;
            if i == 0 {
                oldest_loss = -diff;
            }
        }
    }

    let size = (closes.len() - 1) as f64;
    let avg_gain = gains / size;
    let avg_loss = losses / size;

    let rsi = if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    };

    let target_sell_rsi = if rsi > config.sell_rsi {
        config.sell_rsi + config.rsi_resell_threshold
    } else {
        config.sell_rsi
    };
    let target_buy_rsi = if rsi < config.buy_rsi {
        config.buy_rsi - config.rsi_rebuy_threshold
    } else {
        config.buy_rsi
    };
    let ratio = target_sell_rsi / target_buy_rsi;

    let gain_without_oldest = gains - oldest_gain;
    let loss_without_oldest = losses - oldest_loss;

    let target_loss = (gain_without_oldest * ratio - loss_without_oldest).max(0.0);
    let target_gain = (loss_without_oldest * ratio - gain_without_oldest).max(0.0);

    RsiReading {
        rsi,
        buy_target: round2(newest - target_loss),
        sell_target: round2(newest + target_gain),
    }
}

/// Enrich the newest bar of a chronological window.
///
/// Runs the oscillator three times: on the closes as-is, then with the newest
/// close replaced by the bar's low and by its high.
pub fn enrich(window: &[Bar], config: &BacktestConfig) -> Option<EnrichedBar> {
    let newest = window.last()?;
    let mut closes: Vec<f64> = window.iter().map(|b| b.close).collect();
    let last = closes.len() - 1;

    let reading = compute_rsi(&closes, config);

    closes[last] = newest.low;
    let low_rsi = compute_rsi(&closes, config).rsi;

    closes[last] = newest.high;
    let high_rsi = compute_rsi(&closes, config).rsi;

    Some(EnrichedBar {
        bar: newest.clone(),
        rsi: reading.rsi,
        buy_target: reading.buy_target,
        sell_target: reading.sell_target,
        low_rsi,
        high_rsi,
    })
}
