//! Rolling per-leg price history with flash-crash detection.
//!
//! Read-only with respect to trading decisions: a detected crash raises
//! an alert, it never blocks or forces a trade.

use std::collections::VecDeque;

use rust_decimal::Decimal;

use crate::market::Leg;

/// Maximum samples retained per leg.
const MAX_SAMPLES: usize = 100;

/// One recorded mid-price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSample {
    /// Observation time, milliseconds.
    pub timestamp_ms: i64,
    /// Mid price at that time.
    pub price: Decimal,
}

/// A detected sudden price drop on one leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashCrashEvent {
    /// Which leg crashed.
    pub leg: Leg,
    /// Price at the start of the lookback window.
    pub old_price: Decimal,
    /// Latest price.
    pub new_price: Decimal,
    /// Absolute drop (old - new).
    pub drop: Decimal,
    /// When the crash was detected, milliseconds.
    pub timestamp_ms: i64,
}

impl FlashCrashEvent {
    /// Drop as a percentage of the old price.
    pub fn drop_percent(&self) -> Decimal {
        if self.old_price > Decimal::ZERO {
            self.drop / self.old_price * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        }
    }
}

/// Bounded price history for both legs.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    lookback_ms: i64,
    drop_threshold: Decimal,
    up: VecDeque<PriceSample>,
    down: VecDeque<PriceSample>,
}

impl PriceHistory {
    /// Create a history with the given lookback window and absolute drop
    /// threshold.
    pub fn new(lookback_seconds: u64, drop_threshold: Decimal) -> Self {
        Self {
            lookback_ms: (lookback_seconds * 1000) as i64,
            drop_threshold,
            up: VecDeque::with_capacity(MAX_SAMPLES),
            down: VecDeque::with_capacity(MAX_SAMPLES),
        }
    }

    fn samples(&self, leg: Leg) -> &VecDeque<PriceSample> {
        match leg {
            Leg::Up => &self.up,
            Leg::Down => &self.down,
        }
    }

    /// Record a mid-price sample. Non-positive prices are ignored.
    pub fn record(&mut self, leg: Leg, price: Decimal, timestamp_ms: i64) {
        if price <= Decimal::ZERO {
            return;
        }
        let samples = match leg {
            Leg::Up => &mut self.up,
            Leg::Down => &mut self.down,
        };
        if samples.len() == MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(PriceSample {
            timestamp_ms,
            price,
        });
    }

    /// Number of samples held for a leg.
    pub fn sample_count(&self, leg: Leg) -> usize {
        self.samples(leg).len()
    }

    /// Latest recorded price for a leg.
    pub fn current_price(&self, leg: Leg) -> Option<Decimal> {
        self.samples(leg).back().map(|s| s.price)
    }

    /// Detect a flash crash on one leg: the latest price sits at least the
    /// threshold below the oldest price inside the lookback window. Needs
    /// at least two samples.
    pub fn detect_flash_crash(&self, leg: Leg, now_ms: i64) -> Option<FlashCrashEvent> {
        let samples = self.samples(leg);
        if samples.len() < 2 {
            return None;
        }
        let current = samples.back()?.price;
        let old = samples
            .iter()
            .find(|s| now_ms - s.timestamp_ms <= self.lookback_ms)
            .map(|s| s.price)?;

        let drop = old - current;
        if drop >= self.drop_threshold {
            Some(FlashCrashEvent {
                leg,
                old_price: old,
                new_price: current,
                drop,
                timestamp_ms: now_ms,
            })
        } else {
            None
        }
    }

    /// Check both legs for a crash.
    pub fn detect_all_crashes(&self, now_ms: i64) -> Vec<FlashCrashEvent> {
        Leg::BOTH
            .iter()
            .filter_map(|&leg| self.detect_flash_crash(leg, now_ms))
            .collect()
    }

    /// Percentage decline from the highest price in the trailing window
    /// to the latest sample in it. `None` with fewer than two samples in
    /// the window.
    pub fn percent_drop(&self, leg: Leg, window_secs: u64, now_ms: i64) -> Option<Decimal> {
        let cutoff = now_ms - (window_secs * 1000) as i64;
        let mut count = 0usize;
        let mut max = Decimal::ZERO;
        let mut current = Decimal::ZERO;
        for sample in self.samples(leg).iter().filter(|s| s.timestamp_ms >= cutoff) {
            count += 1;
            max = max.max(sample.price);
            current = sample.price;
        }
        if count < 2 {
            return None;
        }
        Some((max - current) / max * Decimal::ONE_HUNDRED)
    }

    /// (min, max) price over the trailing window, if any samples fall in it.
    pub fn price_range(&self, leg: Leg, window_secs: u64, now_ms: i64) -> Option<(Decimal, Decimal)> {
        let cutoff = now_ms - (window_secs * 1000) as i64;
        let mut range: Option<(Decimal, Decimal)> = None;
        for sample in self.samples(leg).iter().filter(|s| s.timestamp_ms >= cutoff) {
            range = Some(match range {
                Some((lo, hi)) => (lo.min(sample.price), hi.max(sample.price)),
                None => (sample.price, sample.price),
            });
        }
        range
    }

    /// Max-minus-min price movement over the trailing window.
    pub fn volatility(&self, leg: Leg, window_secs: u64, now_ms: i64) -> Decimal {
        self.price_range(leg, window_secs, now_ms)
            .map(|(lo, hi)| hi - lo)
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn history() -> PriceHistory {
        PriceHistory::new(10, dec!(0.30))
    }

    #[test]
    fn record_ignores_non_positive_prices() {
        let mut h = history();
        h.record(Leg::Up, dec!(0), 1_000);
        h.record(Leg::Up, dec!(-0.5), 2_000);
        assert_eq!(h.sample_count(Leg::Up), 0);

        h.record(Leg::Up, dec!(0.50), 3_000);
        assert_eq!(h.sample_count(Leg::Up), 1);
        assert_eq!(h.current_price(Leg::Up), Some(dec!(0.50)));
    }

    #[test]
    fn history_is_bounded() {
        let mut h = history();
        for i in 0..150 {
            h.record(Leg::Up, dec!(0.50), i * 100);
        }
        assert_eq!(h.sample_count(Leg::Up), 100);
    }

    #[test]
    fn no_crash_with_fewer_than_two_samples() {
        let mut h = history();
        h.record(Leg::Up, dec!(0.10), 1_000);
        assert!(h.detect_flash_crash(Leg::Up, 1_000).is_none());
    }

    #[test]
    fn detects_crash_at_threshold() {
        let mut h = history();
        h.record(Leg::Up, dec!(0.80), 1_000);
        h.record(Leg::Up, dec!(0.50), 5_000);

        let event = h.detect_flash_crash(Leg::Up, 5_000).unwrap();
        assert_eq!(event.drop, dec!(0.30));
        assert_eq!(event.old_price, dec!(0.80));
        assert_eq!(event.new_price, dec!(0.50));
        assert_eq!(event.drop_percent(), dec!(37.5));
    }

    #[test]
    fn no_crash_below_threshold() {
        let mut h = history();
        h.record(Leg::Up, dec!(0.80), 1_000);
        h.record(Leg::Up, dec!(0.60), 5_000);
        assert!(h.detect_flash_crash(Leg::Up, 5_000).is_none());
    }

    #[test]
    fn samples_outside_lookback_do_not_trigger() {
        let mut h = history();
        // Drop happened over 60s, well outside the 10s lookback.
        h.record(Leg::Up, dec!(0.80), 1_000);
        h.record(Leg::Up, dec!(0.45), 61_000);
        assert!(h.detect_flash_crash(Leg::Up, 61_000).is_none());
    }

    #[test]
    fn crash_on_one_leg_only() {
        let mut h = history();
        h.record(Leg::Up, dec!(0.80), 1_000);
        h.record(Leg::Up, dec!(0.40), 2_000);
        h.record(Leg::Down, dec!(0.20), 1_000);
        h.record(Leg::Down, dec!(0.60), 2_000);

        let crashes = h.detect_all_crashes(2_000);
        assert_eq!(crashes.len(), 1);
        assert_eq!(crashes[0].leg, Leg::Up);
    }

    #[test]
    fn percent_drop_measures_from_window_max() {
        let mut h = history();
        h.record(Leg::Up, dec!(0.50), 1_000);
        h.record(Leg::Up, dec!(0.80), 2_000);

        // Latest at the max reads as zero decline.
        assert_eq!(h.percent_drop(Leg::Up, 10, 2_000), Some(dec!(0)));

        h.record(Leg::Up, dec!(0.60), 3_000);

        // Max in window is 0.80, latest 0.60: a 25% decline.
        assert_eq!(h.percent_drop(Leg::Up, 10, 3_000), Some(dec!(25)));
    }

    #[test]
    fn percent_drop_needs_two_samples_in_window() {
        let mut h = history();
        assert_eq!(h.percent_drop(Leg::Up, 10, 1_000), None);

        h.record(Leg::Up, dec!(0.80), 1_000);
        assert_eq!(h.percent_drop(Leg::Up, 10, 1_000), None);

        // The older sample has aged out of the window.
        h.record(Leg::Up, dec!(0.60), 30_000);
        assert_eq!(h.percent_drop(Leg::Up, 10, 30_000), None);
    }

    #[test]
    fn price_range_and_volatility() {
        let mut h = history();
        h.record(Leg::Up, dec!(0.40), 1_000);
        h.record(Leg::Up, dec!(0.55), 2_000);
        h.record(Leg::Up, dec!(0.45), 3_000);

        assert_eq!(h.price_range(Leg::Up, 10, 3_000), Some((dec!(0.40), dec!(0.55))));
        assert_eq!(h.volatility(Leg::Up, 10, 3_000), dec!(0.15));
        assert_eq!(h.price_range(Leg::Down, 10, 3_000), None);
    }
}
