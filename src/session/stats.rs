//! Session-level statistics, exposed over the status API.

use rust_decimal::Decimal;
use serde::Serialize;

/// Running totals for one session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    /// Trades counted against the session limit.
    pub trades_executed: u32,
    /// Tradable signals observed (whether or not acted on).
    pub opportunities_seen: u64,
    /// Executions that ended one-sided.
    pub partial_fills: u64,
    /// Batches the venue rejected outright.
    pub rejected_trades: u64,
    /// Flash crash alerts raised.
    pub flash_crash_alerts: u64,
    /// Sum of realized profits.
    pub cumulative_profit: Decimal,
    /// Total dollars spent on fills.
    pub total_invested: Decimal,
}

impl SessionStats {
    /// Profit guaranteed at settlement per invested dollar, as a
    /// percentage. Zero when nothing was invested.
    pub fn return_pct(&self) -> Decimal {
        if self.total_invested > Decimal::ZERO {
            self.cumulative_profit / self.total_invested * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        }
    }
}
