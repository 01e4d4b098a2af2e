//! Spread computation over the top of both books.

use rust_decimal::Decimal;
use tracing::{debug, info};

/// Immutable evaluation of one tick.
///
/// `spread = 1.00 - (ask_up + ask_down)`. The signal never mutates book
/// state; a new one is produced per evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeSignal {
    /// Best UP ask, if any.
    pub ask_up: Option<Decimal>,
    /// Best DOWN ask, if any.
    pub ask_down: Option<Decimal>,
    /// Sum of both asks, when both sides have liquidity.
    pub combined_ask: Option<Decimal>,
    /// Guaranteed edge per share before buffers.
    pub spread: Option<Decimal>,
    /// Whether the spread clears the configured minimum.
    pub tradable: bool,
}

impl std::fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn fmt_opt(value: Option<Decimal>) -> String {
            value.map(|d| d.to_string()).unwrap_or_else(|| "N/A".to_string())
        }
        write!(
            f,
            "UP=${} + DOWN=${} = ${} | spread={} | tradable={}",
            fmt_opt(self.ask_up),
            fmt_opt(self.ask_down),
            fmt_opt(self.combined_ask),
            fmt_opt(self.spread),
            self.tradable,
        )
    }
}

/// Evaluates spreads against a configured minimum.
#[derive(Debug, Clone)]
pub struct SpreadEvaluator {
    min_spread: Decimal,
    price_buffer: Decimal,
}

impl SpreadEvaluator {
    /// Create an evaluator. `min_spread` is the smallest tradable spread;
    /// `price_buffer` is the per-leg limit price pad used to judge whether
    /// a tradable spread is still worth paying the buffer for.
    pub fn new(min_spread: Decimal, price_buffer: Decimal) -> Self {
        Self {
            min_spread,
            price_buffer,
        }
    }

    /// Evaluate the current asks. A missing ask on either side yields a
    /// non-tradable signal; a spread exactly equal to the minimum is
    /// tradable.
    pub fn evaluate(&self, ask_up: Option<Decimal>, ask_down: Option<Decimal>) -> TradeSignal {
        let combined_ask = match (ask_up, ask_down) {
            (Some(up), Some(down)) => Some(up + down),
            _ => None,
        };
        let spread = combined_ask.map(|c| Decimal::ONE - c);
        let tradable = spread.map(|s| s >= self.min_spread).unwrap_or(false);

        let signal = TradeSignal {
            ask_up,
            ask_down,
            combined_ask,
            spread,
            tradable,
        };

        if tradable {
            info!(signal = %signal, "Tradable spread detected");
        } else {
            debug!(signal = %signal, min_spread = %self.min_spread, "No opportunity");
        }

        signal
    }

    /// Edge left per share after paying the buffer on both legs. Worst
    /// case: fills usually land at the observed asks, not the padded
    /// limits. Informational, does not gate execution.
    pub fn spread_after_buffer(&self, signal: &TradeSignal) -> Option<Decimal> {
        signal.spread.map(|s| s - self.price_buffer * Decimal::TWO)
    }

    /// The configured minimum spread.
    pub fn min_spread(&self) -> Decimal {
        self.min_spread
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn evaluator() -> SpreadEvaluator {
        SpreadEvaluator::new(dec!(0.02), dec!(0.01))
    }

    #[test]
    fn positive_spread_above_minimum_is_tradable() {
        let signal = evaluator().evaluate(Some(dec!(0.48)), Some(dec!(0.49)));
        assert_eq!(signal.combined_ask, Some(dec!(0.97)));
        assert_eq!(signal.spread, Some(dec!(0.03)));
        assert!(signal.tradable);
    }

    #[test]
    fn boundary_spread_is_tradable() {
        let signal = evaluator().evaluate(Some(dec!(0.49)), Some(dec!(0.49)));
        assert_eq!(signal.spread, Some(dec!(0.02)));
        assert!(signal.tradable);
    }

    #[test]
    fn spread_below_minimum_is_not_tradable() {
        let signal = evaluator().evaluate(Some(dec!(0.50)), Some(dec!(0.49)));
        assert_eq!(signal.spread, Some(dec!(0.01)));
        assert!(!signal.tradable);
    }

    #[test]
    fn negative_spread_is_not_tradable() {
        let signal = evaluator().evaluate(Some(dec!(0.55)), Some(dec!(0.55)));
        assert_eq!(signal.spread, Some(dec!(-0.10)));
        assert!(!signal.tradable);
    }

    #[test]
    fn missing_ask_is_never_tradable() {
        let signal = evaluator().evaluate(None, Some(dec!(0.10)));
        assert_eq!(signal.combined_ask, None);
        assert_eq!(signal.spread, None);
        assert!(!signal.tradable);

        let signal = evaluator().evaluate(Some(dec!(0.10)), None);
        assert!(!signal.tradable);
    }

    #[test]
    fn spread_after_buffer_subtracts_both_legs() {
        let eval = evaluator();

        let thin = eval.evaluate(Some(dec!(0.49)), Some(dec!(0.49)));
        assert_eq!(eval.spread_after_buffer(&thin), Some(dec!(0.00)));

        let fat = eval.evaluate(Some(dec!(0.48)), Some(dec!(0.49)));
        assert_eq!(eval.spread_after_buffer(&fat), Some(dec!(0.01)));
    }
}
