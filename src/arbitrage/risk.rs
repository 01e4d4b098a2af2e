//! Pre-trade risk checks and session risk state.

use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::Config;

/// Session-scoped risk counters. Owned by the session controller and
/// never reset mid-session.
#[derive(Debug, Clone, Default)]
pub struct RiskState {
    /// Completed trades counted against the session limit.
    pub trades_executed: u32,
    /// When the last counted trade completed.
    pub last_trade_time: Option<Instant>,
    /// Sum of realized profits across completed trades.
    pub cumulative_profit: Decimal,
}

/// Why the gate denied a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Session trade cap reached. Terminal for the session.
    SessionLimitReached,
    /// Cooldown since the last trade has not elapsed. Transient.
    Cooldown {
        /// Time left until the gate reopens.
        remaining: Duration,
    },
    /// Requested size exceeds the per-trade ceiling.
    SizeExceeded,
}

/// Gate decision for one prospective trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Trade may proceed.
    Allowed,
    /// Trade must not proceed.
    Denied(DenyReason),
}

impl GateDecision {
    /// Whether the trade may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }
}

/// Enforces cooldown, session trade cap, and per-trade size ceiling.
///
/// The pre-trade check is advisory; the post-trade update is the
/// authoritative state change. An in-flight attempt with an unknown
/// outcome updates nothing until reconciled.
#[derive(Debug)]
pub struct RiskGate {
    max_trades: u32,
    cooldown: Duration,
    max_trade_size: Decimal,
    count_rejected_trades: bool,
    state: RiskState,
}

impl RiskGate {
    /// Build a gate from config.
    pub fn new(config: &Config) -> Self {
        Self {
            max_trades: config.max_trades,
            cooldown: Duration::from_secs(config.cooldown_seconds),
            max_trade_size: config.max_trade_size,
            count_rejected_trades: config.count_rejected_trades,
            state: RiskState::default(),
        }
    }

    /// Check whether a trade of `size` shares per leg may proceed at `now`.
    pub fn check(&self, now: Instant, size: Decimal) -> GateDecision {
        if self.state.trades_executed >= self.max_trades {
            return GateDecision::Denied(DenyReason::SessionLimitReached);
        }

        if let Some(last) = self.state.last_trade_time {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                return GateDecision::Denied(DenyReason::Cooldown {
                    remaining: self.cooldown - elapsed,
                });
            }
        }

        if size > self.max_trade_size {
            return GateDecision::Denied(DenyReason::SizeExceeded);
        }

        GateDecision::Allowed
    }

    /// Record a trade that confirmed fills. Starts the cooldown clock and
    /// counts against the session limit.
    pub fn record_filled(&mut self, now: Instant, profit: Decimal) {
        self.state.trades_executed += 1;
        self.state.last_trade_time = Some(now);
        self.state.cumulative_profit += profit;
        info!(
            trades = self.state.trades_executed,
            max = self.max_trades,
            profit = %profit,
            cumulative = %self.state.cumulative_profit,
            "Trade recorded"
        );
    }

    /// Record a venue-rejected attempt. Never starts the cooldown clock;
    /// counts against the session limit only under the configured policy.
    pub fn record_rejected(&mut self) {
        if self.count_rejected_trades {
            self.state.trades_executed += 1;
            warn!(
                trades = self.state.trades_executed,
                max = self.max_trades,
                "Rejected attempt counted against session limit"
            );
        }
    }

    /// Whether the session trade cap has been reached.
    pub fn session_limit_reached(&self) -> bool {
        self.state.trades_executed >= self.max_trades
    }

    /// Remaining cooldown at `now`, if any.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.state.last_trade_time?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.cooldown {
            Some(self.cooldown - elapsed)
        } else {
            None
        }
    }

    /// Current risk counters.
    pub fn state(&self) -> &RiskState {
        &self.state
    }
}
