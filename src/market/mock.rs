//! Mock venue for unit and integration testing.
//!
//! Implements [`Venue`] with per-leg scripted outcomes so tests can
//! exercise fills, partial fills, rejections, and unresolved orders
//! without network access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::ExecutionError;
use crate::execution::{
    BatchOrderRequest, OrderLeg, OrderState, OrderStatus, Position, SubmittedOrder, Venue,
};
use crate::market::Leg;

/// What one leg of a submitted batch does at the mock venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Fill the full ordered size at the limit price.
    Fill,
    /// Fill part of the ordered size, then cancel the rest (FAK).
    Partial(Decimal),
    /// Reject the order outright.
    Reject,
    /// Stay live forever; the engine's poll deadline decides.
    Hang,
}

/// Batch-level submission behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubmitBehavior {
    /// Accept the batch and script each leg individually.
    #[default]
    Accept,
    /// Reject the whole batch with a venue reason.
    RejectBatch(String),
    /// Fail with an authentication error.
    AuthFailure,
    /// Fail with a transport error, leaving the outcome unknown.
    TransportError,
}

#[derive(Debug, Default)]
struct MockState {
    scripts: HashMap<Leg, ScriptedOutcome>,
    submit_behavior: SubmitBehavior,
    orders: HashMap<String, OrderState>,
    positions: Vec<Position>,
    balance: Decimal,
    fail_balance: bool,
    fail_status: bool,
    fail_cancel: bool,
    fail_positions: bool,
    canceled: Vec<String>,
    single_orders: Vec<OrderLeg>,
    batches: u64,
}

/// Scriptable in-memory venue.
#[derive(Debug, Clone, Default)]
pub struct MockVenue {
    state: Arc<Mutex<MockState>>,
    next_id: Arc<AtomicU64>,
}

impl MockVenue {
    /// Mock venue that fills everything, with the given balance.
    pub fn filling(balance: Decimal) -> Self {
        let venue = Self::default();
        venue.set_balance(balance);
        venue
    }

    /// Script one leg's outcome for subsequent batches.
    pub fn script(&self, leg: Leg, outcome: ScriptedOutcome) {
        self.lock().scripts.insert(leg, outcome);
    }

    /// Set batch-level submission behavior.
    pub fn set_submit_behavior(&self, behavior: SubmitBehavior) {
        self.lock().submit_behavior = behavior;
    }

    /// Set the collateral balance.
    pub fn set_balance(&self, balance: Decimal) {
        self.lock().balance = balance;
    }

    /// Make the balance endpoint fail.
    pub fn fail_balance(&self, fail: bool) {
        self.lock().fail_balance = fail;
    }

    /// Make status queries fail.
    pub fn fail_status(&self, fail: bool) {
        self.lock().fail_status = fail;
    }

    /// Make cancels fail.
    pub fn fail_cancel(&self, fail: bool) {
        self.lock().fail_cancel = fail;
    }

    /// Make the positions endpoint fail.
    pub fn fail_positions(&self, fail: bool) {
        self.lock().fail_positions = fail;
    }

    /// Add a held position, for reconciliation tests.
    pub fn add_position(&self, token_id: impl Into<String>, size: Decimal, avg_price: Decimal) {
        self.lock().positions.push(Position {
            token_id: token_id.into(),
            size,
            avg_price: Some(avg_price),
        });
    }

    /// Order ids passed to cancel calls so far.
    pub fn canceled_orders(&self) -> Vec<String> {
        self.lock().canceled.clone()
    }

    /// Single (non-batch) orders submitted so far.
    pub fn single_orders(&self) -> Vec<OrderLeg> {
        self.lock().single_orders.clone()
    }

    /// Number of batches submitted so far.
    pub fn batch_count(&self) -> u64 {
        self.lock().batches
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // Mutex poisoning cannot happen here; state mutations do not panic.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn fresh_id(&self, prefix: &str) -> String {
        format!("mock-{prefix}-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn scripted_state(order_id: String, order: &OrderLeg, outcome: ScriptedOutcome) -> OrderState {
        match outcome {
            ScriptedOutcome::Fill => OrderState {
                order_id,
                status: Some(OrderStatus::Filled),
                filled_size: Some(order.size),
                remaining_size: Some(Decimal::ZERO),
                avg_fill_price: Some(order.limit_price),
            },
            ScriptedOutcome::Partial(filled) => OrderState {
                order_id,
                status: Some(OrderStatus::Canceled),
                filled_size: Some(filled),
                remaining_size: Some(order.size - filled),
                avg_fill_price: Some(order.limit_price),
            },
            ScriptedOutcome::Reject => OrderState {
                order_id,
                status: Some(OrderStatus::Rejected),
                filled_size: Some(Decimal::ZERO),
                remaining_size: Some(order.size),
                avg_fill_price: None,
            },
            ScriptedOutcome::Hang => OrderState {
                order_id,
                status: Some(OrderStatus::Live),
                filled_size: Some(Decimal::ZERO),
                remaining_size: Some(order.size),
                avg_fill_price: None,
            },
        }
    }
}

#[async_trait]
impl Venue for MockVenue {
    async fn submit_batch(
        &self,
        request: &BatchOrderRequest,
    ) -> Result<Vec<SubmittedOrder>, ExecutionError> {
        let behavior = self.lock().submit_behavior.clone();
        match behavior {
            SubmitBehavior::Accept => {}
            SubmitBehavior::RejectBatch(reason) => {
                return Err(ExecutionError::OrderRejected { reason });
            }
            SubmitBehavior::AuthFailure => {
                return Err(ExecutionError::AuthenticationFailed(
                    "mock auth failure".to_string(),
                ));
            }
            SubmitBehavior::TransportError => {
                return Err(ExecutionError::SubmissionFailed(
                    "mock transport error".to_string(),
                ));
            }
        }

        let mut acks = Vec::with_capacity(request.legs.len());
        for order in &request.legs {
            let order_id = self.fresh_id(&order.leg.to_string().to_lowercase());
            let outcome = self
                .lock()
                .scripts
                .get(&order.leg)
                .copied()
                .unwrap_or(ScriptedOutcome::Fill);
            let state = Self::scripted_state(order_id.clone(), order, outcome);
            self.lock().orders.insert(order_id.clone(), state);
            acks.push(SubmittedOrder {
                leg: order.leg,
                order_id,
            });
        }
        self.lock().batches += 1;
        Ok(acks)
    }

    async fn submit_order(&self, order: &OrderLeg) -> Result<SubmittedOrder, ExecutionError> {
        self.lock().single_orders.push(order.clone());
        let order_id = self.fresh_id("single");
        let outcome = self
            .lock()
            .scripts
            .get(&order.leg)
            .copied()
            .unwrap_or(ScriptedOutcome::Fill);
        let state = Self::scripted_state(order_id.clone(), order, outcome);
        self.lock().orders.insert(order_id.clone(), state);
        Ok(SubmittedOrder {
            leg: order.leg,
            order_id,
        })
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderState, ExecutionError> {
        let state = self.lock();
        if state.fail_status {
            return Err(ExecutionError::StatusFailed {
                order_id: order_id.to_string(),
                reason: "mock status failure".to_string(),
            });
        }
        state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| ExecutionError::StatusFailed {
                order_id: order_id.to_string(),
                reason: "unknown order".to_string(),
            })
    }

    async fn cancel_orders(&self, order_ids: &[String]) -> Result<(), ExecutionError> {
        let mut state = self.lock();
        if state.fail_cancel {
            return Err(ExecutionError::CancelFailed {
                order_id: order_ids.join(","),
                reason: "mock cancel failure".to_string(),
            });
        }
        state.canceled.extend_from_slice(order_ids);
        for id in order_ids {
            if let Some(order) = state.orders.get_mut(id) {
                if order.status == Some(OrderStatus::Live)
                    || order.status == Some(OrderStatus::Pending)
                {
                    order.status = Some(OrderStatus::Canceled);
                }
            }
        }
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<Position>, ExecutionError> {
        let state = self.lock();
        if state.fail_positions {
            return Err(ExecutionError::PositionsFailed(
                "mock positions failure".to_string(),
            ));
        }
        Ok(state.positions.clone())
    }

    async fn balance(&self) -> Result<Decimal, ExecutionError> {
        let state = self.lock();
        if state.fail_balance {
            return Err(ExecutionError::SubmissionFailed(
                "mock balance failure".to_string(),
            ));
        }
        Ok(state.balance)
    }
}
