//! Venue trait: the seam between the execution engine and transport.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::order::{BatchOrderRequest, OrderLeg, OrderState};
use crate::error::ExecutionError;
use crate::market::Leg;

/// Acknowledgement for one submitted order.
#[derive(Debug, Clone)]
pub struct SubmittedOrder {
    /// Which leg the order buys.
    pub leg: Leg,
    /// Venue-assigned order id.
    pub order_id: String,
}

/// A held token position, used for reconciliation.
#[derive(Debug, Clone)]
pub struct Position {
    /// Token id held.
    pub token_id: String,
    /// Shares held.
    pub size: Decimal,
    /// Average entry price, when the venue reports one.
    pub avg_price: Option<Decimal>,
}

/// Operations the engine needs from a venue.
///
/// Implemented by the signed HTTP client for live trading and by the
/// mock venue in tests.
#[async_trait]
pub trait Venue: Send + Sync {
    /// Submit both legs in one atomic batch call. Returns one ack per
    /// accepted order; a batch-level failure is an error.
    async fn submit_batch(
        &self,
        request: &BatchOrderRequest,
    ) -> Result<Vec<SubmittedOrder>, ExecutionError>;

    /// Submit a single order (used for partial-fill remediation).
    async fn submit_order(&self, order: &OrderLeg) -> Result<SubmittedOrder, ExecutionError>;

    /// Fetch current state of one order.
    async fn order_status(&self, order_id: &str) -> Result<OrderState, ExecutionError>;

    /// Cancel the given orders. Best-effort; already-terminal orders are
    /// not an error.
    async fn cancel_orders(&self, order_ids: &[String]) -> Result<(), ExecutionError>;

    /// Current token positions, for reconciliation after an unknown
    /// outcome.
    async fn positions(&self) -> Result<Vec<Position>, ExecutionError>;

    /// Available collateral balance in dollars.
    async fn balance(&self) -> Result<Decimal, ExecutionError>;
}
