//! 15-minute UP/DOWN paired markets.
//!
//! This module handles:
//! - Market and leg types
//! - Market discovery (finding the active window)
//! - The signed CLOB venue client
//! - A scriptable mock venue for testing

pub mod client;
pub mod discovery;
pub mod mock;
pub mod types;

pub use client::VenueClient;
pub use discovery::{discover_active_market, ensure_open, fetch_market_from_slug, next_slug};
pub use mock::{MockVenue, ScriptedOutcome, SubmitBehavior};
pub use types::{Coin, Leg, PairedMarket};
