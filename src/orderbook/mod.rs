//! Order book state and price history.
//!
//! This module handles:
//! - Book event types shared with the feed
//! - Per-leg top-of-book state with staleness handling
//! - Rolling price history and flash crash detection

pub mod history;
pub mod state;
pub mod types;

pub use history::{FlashCrashEvent, PriceHistory, PriceSample};
pub use state::{Applied, OrderbookState};
pub use types::{BookEvent, BookEventKind, PriceLevel, TopOfBook};
