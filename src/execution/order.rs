//! Order and execution report types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::market::Leg;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order.
    #[strum(serialize = "BUY", serialize = "buy")]
    Buy,
    /// Sell order.
    #[strum(serialize = "SELL", serialize = "sell")]
    Sell,
}

/// Order time-in-force.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Fill-or-kill: must fill entirely or cancel.
    #[default]
    #[strum(serialize = "FOK", serialize = "fok")]
    FOK,
    /// Fill-and-kill: fill what's available, cancel rest.
    #[strum(serialize = "FAK", serialize = "fak")]
    FAK,
    /// Good-till-cancelled: stays on book until filled or cancelled.
    #[strum(serialize = "GTC", serialize = "gtc")]
    GTC,
}

/// Order status from the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order is pending.
    #[strum(serialize = "pending", serialize = "PENDING")]
    Pending,
    /// Order is live on the book.
    #[strum(serialize = "live", serialize = "LIVE")]
    Live,
    /// Order is fully filled.
    #[strum(serialize = "filled", serialize = "FILLED")]
    Filled,
    /// Order was cancelled.
    #[strum(
        serialize = "canceled",
        serialize = "cancelled",
        serialize = "CANCELED",
        serialize = "CANCELLED"
    )]
    Canceled,
    /// Order was rejected.
    #[strum(serialize = "rejected", serialize = "REJECTED")]
    Rejected,
    /// Order expired.
    #[strum(serialize = "expired", serialize = "EXPIRED")]
    Expired,
}

impl OrderStatus {
    /// Check if status is terminal (won't change).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// Check if order was fully filled.
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Filled)
    }
}

/// Per-order state as reported by the venue.
#[derive(Debug, Clone, Default)]
pub struct OrderState {
    /// Order ID.
    pub order_id: String,
    /// Current status. `None` when the venue could not tell us.
    pub status: Option<OrderStatus>,
    /// Filled size.
    pub filled_size: Option<Decimal>,
    /// Remaining size.
    pub remaining_size: Option<Decimal>,
    /// Average fill price.
    pub avg_fill_price: Option<Decimal>,
}

/// One leg of a paired order batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLeg {
    /// Which leg this order buys.
    pub leg: Leg,
    /// Token ID to trade.
    pub token_id: String,
    /// Order side. Always Buy for the arbitrage pair.
    pub side: Side,
    /// Limit price.
    pub limit_price: Decimal,
    /// Order size in shares.
    pub size: Decimal,
    /// Time-in-force.
    pub tif: TimeInForce,
}

impl OrderLeg {
    /// Validate leg parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.token_id.is_empty() {
            return Err("token_id is required".to_string());
        }
        if self.limit_price <= Decimal::ZERO {
            return Err("limit_price must be positive".to_string());
        }
        if self.size <= Decimal::ZERO {
            return Err("size must be positive".to_string());
        }
        Ok(())
    }
}

/// An atomic two-leg order batch: both BUY legs of one arbitrage trade,
/// submitted in a single venue call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOrderRequest {
    /// Client-side id tying both legs to one trade attempt.
    pub client_order_id: String,
    /// Unix expiry timestamp for both orders.
    pub expiry_ts: i64,
    /// The UP and DOWN legs.
    pub legs: Vec<OrderLeg>,
}

impl BatchOrderRequest {
    /// Validate the batch: exactly one order per leg, each well-formed.
    pub fn validate(&self) -> Result<(), String> {
        if self.legs.len() != 2 {
            return Err(format!("expected 2 legs, got {}", self.legs.len()));
        }
        if self.legs[0].leg == self.legs[1].leg {
            return Err("both orders are for the same leg".to_string());
        }
        for leg in &self.legs {
            leg.validate()?;
        }
        Ok(())
    }

    /// The order for a given leg.
    pub fn leg(&self, leg: Leg) -> Option<&OrderLeg> {
        self.legs.iter().find(|l| l.leg == leg)
    }

    /// Total cost if both legs fill at their limits.
    pub fn max_cost(&self) -> Decimal {
        self.legs.iter().map(|l| l.limit_price * l.size).sum()
    }
}

/// Final classification of one leg after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    /// Fully filled.
    Filled,
    /// Partially filled; a remainder rested or was cancelled.
    PartiallyFilled,
    /// Rejected or unfilled terminal.
    Rejected,
    /// Outcome could not be confirmed. Requires reconciliation before
    /// any new trade.
    Unknown,
}

/// Per-leg execution outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegResult {
    /// Which leg.
    pub leg: Leg,
    /// Venue order id, when submission got that far.
    pub order_id: Option<String>,
    /// Final classification.
    pub status: LegStatus,
    /// Shares actually filled.
    pub filled_size: Decimal,
    /// Average price paid for the filled shares.
    pub avg_fill_price: Decimal,
}

impl LegResult {
    /// A leg that never reached the venue or filled nothing.
    pub fn empty(leg: Leg, status: LegStatus) -> Self {
        Self {
            leg,
            order_id: None,
            status,
            filled_size: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
        }
    }
}

/// What was done about a one-sided fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum RemediationAction {
    /// Resting remainder cancelled.
    RemainderCanceled,
    /// Remainder cancelled, then the missing size was bought at an
    /// aggressive marketable limit.
    MarketOut {
        /// Shares recovered by the follow-up buy.
        recovered_size: Decimal,
    },
    /// Cancel attempt failed; position is still naked.
    CancelFailed {
        /// Venue error text.
        reason: String,
    },
}

/// Escalation raised when the trade left a one-sided position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFillEscalation {
    /// Leg that (partially or fully) filled.
    pub filled_leg: Leg,
    /// Shares held on the filled leg.
    pub filled_size: Decimal,
    /// Leg that is short.
    pub unfilled_leg: Leg,
    /// Shares missing on the unfilled leg.
    pub missing_size: Decimal,
    /// Compensating action taken.
    pub remediation: RemediationAction,
}

/// Immutable record of one execution attempt. Finalized once and kept
/// for audit logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Client order id of the batch this reports on.
    pub client_order_id: String,
    /// UP leg outcome.
    pub up: LegResult,
    /// DOWN leg outcome.
    pub down: LegResult,
    /// Realized profit. `Some` only when both legs fully filled:
    /// min(filled sizes) pays $1.00 at settlement, minus total cost.
    pub realized_profit: Option<Decimal>,
    /// Escalation, when exactly one side ended up held.
    pub escalation: Option<PartialFillEscalation>,
}

impl ExecutionReport {
    /// Build a report, deriving `realized_profit` from the leg results.
    pub fn new(
        client_order_id: String,
        up: LegResult,
        down: LegResult,
        escalation: Option<PartialFillEscalation>,
    ) -> Self {
        let realized_profit = if up.status == LegStatus::Filled && down.status == LegStatus::Filled
        {
            let guaranteed = up.filled_size.min(down.filled_size);
            let cost =
                up.avg_fill_price * up.filled_size + down.avg_fill_price * down.filled_size;
            Some(guaranteed - cost)
        } else {
            None
        };

        Self {
            client_order_id,
            up,
            down,
            realized_profit,
            escalation,
        }
    }

    /// Leg result by leg.
    pub fn leg(&self, leg: Leg) -> &LegResult {
        match leg {
            Leg::Up => &self.up,
            Leg::Down => &self.down,
        }
    }

    /// Whether both legs fully filled.
    pub fn both_filled(&self) -> bool {
        self.up.status == LegStatus::Filled && self.down.status == LegStatus::Filled
    }

    /// Whether any leg outcome is still unconfirmed.
    pub fn has_unknown(&self) -> bool {
        self.up.status == LegStatus::Unknown || self.down.status == LegStatus::Unknown
    }

    /// Whether both legs were rejected with nothing filled.
    pub fn fully_rejected(&self) -> bool {
        self.up.status == LegStatus::Rejected
            && self.down.status == LegStatus::Rejected
            && self.up.filled_size == Decimal::ZERO
            && self.down.filled_size == Decimal::ZERO
    }

    /// Total amount spent across both legs.
    pub fn total_cost(&self) -> Decimal {
        self.up.avg_fill_price * self.up.filled_size
            + self.down.avg_fill_price * self.down.filled_size
    }
}
