//! Portfolio ledger: folds the transaction log into cash, position and P&L.

use super::oscillator::round2;
use super::signal::{Side, Transaction};

const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub starting_cash: f64,
    pub cash: f64,
    pub position: f64,
    /// Position valued at the last transaction price, rounded to cents.
    pub position_value: f64,
    /// Weighted average cost of the position.
    pub mean_price: f64,
    pub realized_pnl: f64,
    pub mtm: f64,
    pub pnl: f64,
    /// Lowest cash balance reached; `starting_cash - min_cash` is the peak
    /// capital deployed.
    pub min_cash: f64,
    pub market_price: f64,
    /// Annualized realized return on peak deployed capital, in percent.
    pub return_on_capital: f64,
}

impl Portfolio {
    pub fn new(starting_cash: f64) -> Self {
        Portfolio {
            starting_cash,
            cash: starting_cash,
            position: 0.0,
            position_value: 0.0,
            mean_price: 0.0,
            realized_pnl: 0.0,
            mtm: 0.0,
            pnl: 0.0,
            min_cash: starting_cash,
            market_price: 0.0,
            return_on_capital: 0.0,
        }
    }

    /// Rebuild a portfolio from the full transaction log, oldest first, and
    /// mark it against `market_price` over `window_size` bars.
    pub fn replay(
        starting_cash: f64,
        transactions: &[Transaction],
        market_price: f64,
        window_size: usize,
    ) -> Self {
        let mut portfolio = Portfolio::new(starting_cash);
        for tx in transactions {
            portfolio.apply(tx);
        }
        portfolio.mark_to_market(market_price, window_size);
        portfolio
    }

    /// Apply one transaction. Returns `false` when a sell is skipped for lack
    /// of position.
    pub fn apply(&mut self, tx: &Transaction) -> bool {
        let applied = match tx.side {
            Side::Buy => {
                self.cash -= tx.price * tx.quantity;
                self.min_cash = self.min_cash.min(self.cash);
                self.mean_price = (self.position * self.mean_price + tx.price * tx.quantity)
                    / (self.position + tx.quantity);
                self.position += tx.quantity;
                // Uses the updated mean: a buy below the old cost basis books a gain.
                self.realized_pnl += (self.mean_price - tx.price) * tx.quantity;
                true
            }
            Side::Sell if self.position >= tx.quantity => {
                self.cash += tx.price * tx.quantity;
                self.position -= tx.quantity;
                self.realized_pnl += (tx.price - self.mean_price) * tx.quantity;
                true
            }
            Side::Sell => false,
        };
        self.position_value = round2(self.position * tx.price);
        applied
    }

    pub fn mark_to_market(&mut self, market_price: f64, window_size: usize) {
        self.market_price = market_price;
        self.mtm = round2((market_price - self.mean_price) * self.position);
        self.pnl = self.realized_pnl + self.mtm;

        let deployed = self.starting_cash - self.min_cash;
        self.return_on_capital = if deployed > 0.0 && window_size > 0 {
            round2(self.realized_pnl / deployed * 100.0 * DAYS_PER_YEAR / window_size as f64)
        } else {
            0.0
        };
    }

    /// Cash plus the position at the last marked price.
    pub fn equity(&self) -> f64 {
        self.cash + self.position * self.market_price
    }
}
