//! Order construction, venue abstraction, and trade execution.
//!
//! This module handles:
//! - Order and batch types with outcome classification
//! - The [`Venue`] trait the live and mock clients implement
//! - The execution engine: pricing, submission, polling, remediation

pub mod engine;
pub mod order;
pub mod venue;

pub use engine::ExecutionEngine;
pub use order::{
    BatchOrderRequest, ExecutionReport, LegResult, LegStatus, OrderLeg, OrderState, OrderStatus,
    PartialFillEscalation, RemediationAction, Side, TimeInForce,
};
pub use venue::{Position, SubmittedOrder, Venue};
