//! Spread evaluation and risk gating.
//!
//! This module handles:
//! - Combined-ask spread evaluation against the entry threshold
//! - Pre-trade risk checks (session cap, cooldown, size ceiling)

pub mod risk;
pub mod spread;

pub use risk::{DenyReason, GateDecision, RiskGate, RiskState};
pub use spread::{SpreadEvaluator, TradeSignal};
