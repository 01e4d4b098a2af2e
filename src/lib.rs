//! Paired-outcome arbitrage engine for 15-minute UP/DOWN markets.
//!
//! Buys both outcomes of one binary market when their combined ask
//! leaves a large enough spread under $1.00, locking in profit at
//! settlement regardless of direction.
//!
//! # Strategy
//!
//! At window close exactly ONE side pays $1.00 per share. Whenever
//! `1.00 - (ask_up + ask_down) >= min_spread`, buying min-filled pairs
//! guarantees the spread as profit:
//!
//! ```text
//! UP ask:    $0.47
//! DOWN ask:  $0.50
//! ────────────────
//! Combined:  $0.97, spread $0.03 per share locked in
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Market discovery and the signed venue client
//! - [`feed`]: WebSocket market data feed with reconnection
//! - [`orderbook`]: Book state, price history, flash crash detection
//! - [`arbitrage`]: Spread evaluation and risk gating
//! - [`execution`]: Atomic paired execution and remediation
//! - [`session`]: The session lifecycle state machine
//! - [`api`]: HTTP API for health/status/metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod arbitrage;
pub mod config;
pub mod error;
pub mod execution;
pub mod feed;
pub mod market;
pub mod metrics;
pub mod orderbook;
pub mod session;
pub mod signing;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, Result};
