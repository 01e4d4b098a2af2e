//! Materialized L2 book state for both legs of a paired market.
//!
//! Single-writer: only the session loop applies events, so no locking.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::warn;

use super::types::{BookEvent, BookEventKind, PriceLevel, TopOfBook};
use crate::error::FeedError;
use crate::market::{Leg, PairedMarket};

/// Outcome of applying a feed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The event mutated the book for this leg.
    Updated(Leg),
    /// The event carried a timestamp older than the last applied one and
    /// was discarded without mutating anything.
    Stale(Leg),
}

/// One leg's ladder: price -> absolute size. BTreeMap because best-of-book
/// is read on every tick.
#[derive(Debug, Clone, Default)]
struct LegBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_timestamp_ms: Option<i64>,
}

impl LegBook {
    fn apply_levels(side: &mut BTreeMap<Decimal, Decimal>, levels: &[PriceLevel]) {
        for level in levels {
            if level.size <= Decimal::ZERO {
                side.remove(&level.price);
            } else {
                side.insert(level.price, level.size);
            }
        }
    }

    fn apply(&mut self, event: &BookEvent) {
        if event.kind == BookEventKind::Snapshot {
            self.bids.clear();
            self.asks.clear();
        }
        Self::apply_levels(&mut self.bids, &event.bids);
        Self::apply_levels(&mut self.asks, &event.asks);
        self.last_timestamp_ms = Some(event.timestamp_ms);
    }

    fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }
}

/// In-memory orderbook for the two legs of one paired market.
#[derive(Debug, Clone)]
pub struct OrderbookState {
    market: PairedMarket,
    up: LegBook,
    down: LegBook,
}

impl OrderbookState {
    /// Create empty books for both legs of the market.
    pub fn new(market: PairedMarket) -> Self {
        Self {
            market,
            up: LegBook::default(),
            down: LegBook::default(),
        }
    }

    fn leg_book(&self, leg: Leg) -> &LegBook {
        match leg {
            Leg::Up => &self.up,
            Leg::Down => &self.down,
        }
    }

    /// Apply a feed event to the leg its token id resolves to.
    ///
    /// Events older than the last applied timestamp for that leg are
    /// discarded silently. A duplicate timestamp is re-applied; sizes are
    /// absolute, so re-application is idempotent. Unknown token ids are an
    /// error, never guessed at.
    pub fn apply(&mut self, event: &BookEvent) -> Result<Applied, FeedError> {
        let leg = self
            .market
            .leg_for_token(&event.token_id)
            .ok_or_else(|| FeedError::InvalidLeg {
                token_id: event.token_id.clone(),
            })?;

        let book = match leg {
            Leg::Up => &mut self.up,
            Leg::Down => &mut self.down,
        };

        if let Some(last) = book.last_timestamp_ms {
            if event.timestamp_ms < last {
                return Ok(Applied::Stale(leg));
            }
        }

        book.apply(event);

        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            if ask < bid {
                warn!(%leg, %bid, %ask, "inverted book, will not trade against it");
            }
        }

        Ok(Applied::Updated(leg))
    }

    /// Best bid for a leg. `None` means no bids.
    pub fn best_bid(&self, leg: Leg) -> Option<Decimal> {
        self.leg_book(leg).best_bid()
    }

    /// Best ask for a leg. `None` means no asks.
    pub fn best_ask(&self, leg: Leg) -> Option<Decimal> {
        self.leg_book(leg).best_ask()
    }

    /// Midpoint of a leg's best bid/ask, if both sides are populated.
    pub fn mid_price(&self, leg: Leg) -> Option<Decimal> {
        let book = self.leg_book(leg);
        match (book.best_bid(), book.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Size available at a leg's best ask.
    pub fn best_ask_size(&self, leg: Leg) -> Decimal {
        let book = self.leg_book(leg);
        book.best_ask()
            .and_then(|price| book.asks.get(&price).copied())
            .unwrap_or(Decimal::ZERO)
    }

    /// Point-in-time summary of one leg.
    pub fn snapshot(&self, leg: Leg) -> TopOfBook {
        let book = self.leg_book(leg);
        TopOfBook {
            leg,
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
            updated_at_ms: book.last_timestamp_ms.unwrap_or(0),
        }
    }

    /// Whether a leg's book is currently inverted.
    pub fn is_inverted(&self, leg: Leg) -> bool {
        self.snapshot(leg).is_inverted()
    }

    /// The market these books belong to.
    pub fn market(&self) -> &PairedMarket {
        &self.market
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_market() -> PairedMarket {
        PairedMarket {
            slug: "btc-updown-15m-123".to_string(),
            id: "market-id".to_string(),
            up_token_id: "up-token".to_string(),
            down_token_id: "down-token".to_string(),
            start_timestamp: 0,
            end_timestamp: 900,
            tick_size: dec!(0.01),
            min_order_size: dec!(5),
            question: None,
        }
    }

    fn snapshot_event(token: &str, ts: i64, bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> BookEvent {
        BookEvent {
            token_id: token.to_string(),
            timestamp_ms: ts,
            kind: BookEventKind::Snapshot,
            bids: bids.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect(),
            asks: asks.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect(),
        }
    }

    fn delta_event(token: &str, ts: i64, bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> BookEvent {
        BookEvent {
            kind: BookEventKind::Delta,
            ..snapshot_event(token, ts, bids, asks)
        }
    }

    #[test]
    fn snapshot_replaces_book() {
        let mut state = OrderbookState::new(test_market());
        state
            .apply(&snapshot_event("up-token", 1, vec![(dec!(0.40), dec!(10))], vec![(dec!(0.45), dec!(10))]))
            .unwrap();
        state
            .apply(&snapshot_event("up-token", 2, vec![(dec!(0.48), dec!(50))], vec![(dec!(0.50), dec!(50))]))
            .unwrap();

        assert_eq!(state.best_bid(Leg::Up), Some(dec!(0.48)));
        assert_eq!(state.best_ask(Leg::Up), Some(dec!(0.50)));
        assert_eq!(state.best_ask_size(Leg::Up), dec!(50));
    }

    #[test]
    fn delta_updates_and_removes_levels() {
        let mut state = OrderbookState::new(test_market());
        state
            .apply(&snapshot_event("up-token", 1, vec![(dec!(0.48), dec!(50))], vec![(dec!(0.50), dec!(50)), (dec!(0.51), dec!(100))]))
            .unwrap();

        // Size zero removes the best ask; the next level becomes best.
        state
            .apply(&delta_event("up-token", 2, vec![], vec![(dec!(0.50), dec!(0))]))
            .unwrap();
        assert_eq!(state.best_ask(Leg::Up), Some(dec!(0.51)));

        state
            .apply(&delta_event("up-token", 3, vec![], vec![(dec!(0.49), dec!(25))]))
            .unwrap();
        assert_eq!(state.best_ask(Leg::Up), Some(dec!(0.49)));
        assert_eq!(state.best_ask_size(Leg::Up), dec!(25));
    }

    #[test]
    fn stale_event_is_discarded_without_mutation() {
        let mut state = OrderbookState::new(test_market());
        state
            .apply(&snapshot_event("up-token", 10, vec![], vec![(dec!(0.50), dec!(50))]))
            .unwrap();

        let applied = state
            .apply(&delta_event("up-token", 5, vec![], vec![(dec!(0.40), dec!(50))]))
            .unwrap();

        assert_eq!(applied, Applied::Stale(Leg::Up));
        assert_eq!(state.best_ask(Leg::Up), Some(dec!(0.50)));
    }

    #[test]
    fn duplicate_timestamp_is_idempotent() {
        let mut state = OrderbookState::new(test_market());
        let event = delta_event("up-token", 10, vec![], vec![(dec!(0.50), dec!(50))]);
        state.apply(&event).unwrap();
        state.apply(&event).unwrap();

        assert_eq!(state.best_ask(Leg::Up), Some(dec!(0.50)));
        assert_eq!(state.best_ask_size(Leg::Up), dec!(50));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let mut state = OrderbookState::new(test_market());
        let result = state.apply(&snapshot_event("other-token", 1, vec![], vec![]));
        assert!(matches!(result, Err(FeedError::InvalidLeg { .. })));
    }

    #[test]
    fn empty_side_reports_none_not_zero() {
        let state = OrderbookState::new(test_market());
        assert_eq!(state.best_ask(Leg::Up), None);
        assert_eq!(state.best_bid(Leg::Down), None);
        assert_eq!(state.mid_price(Leg::Up), None);
    }

    #[test]
    fn legs_are_independent() {
        let mut state = OrderbookState::new(test_market());
        state
            .apply(&snapshot_event("up-token", 1, vec![], vec![(dec!(0.48), dec!(50))]))
            .unwrap();
        state
            .apply(&snapshot_event("down-token", 1, vec![], vec![(dec!(0.49), dec!(75))]))
            .unwrap();

        assert_eq!(state.best_ask(Leg::Up), Some(dec!(0.48)));
        assert_eq!(state.best_ask(Leg::Down), Some(dec!(0.49)));
    }
}
