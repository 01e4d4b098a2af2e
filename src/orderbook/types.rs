//! Order book types and data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::Leg;

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Total size available at this price. Absolute, not a delta.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Kind of book event from the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookEventKind {
    /// Full book snapshot replacing all prior state for the leg.
    Snapshot,
    /// Incremental update. Sizes are absolute replacements per level;
    /// size zero removes the level.
    Delta,
}

/// Typed feed event for one leg's book.
#[derive(Debug, Clone)]
pub struct BookEvent {
    /// Token ID the event refers to.
    pub token_id: String,
    /// Venue timestamp, milliseconds.
    pub timestamp_ms: i64,
    /// Snapshot or delta.
    pub kind: BookEventKind,
    /// Bid levels touched by this event.
    pub bids: Vec<PriceLevel>,
    /// Ask levels touched by this event.
    pub asks: Vec<PriceLevel>,
}

/// Best bid/ask of one leg at a point in time.
///
/// `None` means no liquidity on that side. Absence is never encoded as a
/// zero price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopOfBook {
    /// Which leg this summary belongs to.
    pub leg: Leg,
    /// Best bid price, if any bids exist.
    pub best_bid: Option<Decimal>,
    /// Best ask price, if any asks exist.
    pub best_ask: Option<Decimal>,
    /// Timestamp of the last applied event, milliseconds.
    pub updated_at_ms: i64,
}

impl TopOfBook {
    /// Midpoint of best bid and ask, if both sides are populated.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Check if the book is inverted (best_ask < best_bid).
    pub fn is_inverted(&self) -> bool {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => ask < bid,
            _ => false,
        }
    }
}
