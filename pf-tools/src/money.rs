//! Single source of truth for money crossing the gateway.
//!
//! The ledger carries every amount twice: a legacy `f64` dollar field and an `i64` cents
//! field. Nonzero cents always win; the dollar field is trusted only when cents is zero.
//! Conversion to cents works on the decimal the caller wrote (the shortest representation
//! of the `f64`), rounded half away from zero, so `1.005` becomes 101 cents rather than the
//! 100 that scaling the binary value would give.

use pf_ledger::{Budget, DuplicateMatch, Expense, Income};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Authoritative dollar value of a `(dollars, cents)` pair.
pub fn resolve_amount(dollars: f64, cents: i64) -> f64 {
    if cents != 0 {
        cents as f64 / 100.0
    } else {
        dollars
    }
}

pub fn to_cents(dollars: f64) -> i64 {
    Decimal::from_str(&dollars.to_string())
        .ok()
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| (d * Decimal::ONE_HUNDRED).to_i64())
        // Non-finite or beyond Decimal range.
        .unwrap_or_else(|| (dollars * 100.0).round() as i64)
}

/// Cents value of a pair, converting the legacy field only when cents is absent.
pub fn resolved_cents(dollars: f64, cents: i64) -> i64 {
    if cents != 0 { cents } else { to_cents(dollars) }
}

pub fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// `$5.50`, `-$3.07`.
pub fn format_dollars(dollars: f64) -> String {
    format_cents(to_cents(dollars))
}

pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

/// Records that carry one money pair.
pub trait Monetary {
    fn money_pair(&self) -> (f64, i64);

    fn resolved_amount(&self) -> f64 {
        let (dollars, cents) = self.money_pair();
        resolve_amount(dollars, cents)
    }

    fn amount_in_cents(&self) -> i64 {
        let (dollars, cents) = self.money_pair();
        resolved_cents(dollars, cents)
    }
}

impl Monetary for Expense {
    fn money_pair(&self) -> (f64, i64) {
        (self.amount, self.amount_cents)
    }
}

impl Monetary for Income {
    fn money_pair(&self) -> (f64, i64) {
        (self.amount, self.amount_cents)
    }
}

impl Monetary for Budget {
    fn money_pair(&self) -> (f64, i64) {
        (self.amount, self.amount_cents)
    }
}

impl Monetary for DuplicateMatch {
    fn money_pair(&self) -> (f64, i64) {
        (self.amount, self.amount_cents)
    }
}

/// The pair sent to the ledger for an agent-supplied dollar amount; both halves agree.
pub fn outgoing_pair(dollars: f64) -> (f64, i64) {
    let cents = to_cents(dollars);
    (cents_to_dollars(cents), cents)
}

#[cfg(test)]
mod tests {
    use super::{
        Monetary, format_cents, format_dollars, outgoing_pair, resolve_amount, resolved_cents,
        to_cents,
    };
    use pf_ledger::Expense;

    /// Deterministic (dollars, cents) pairs, cents = 0 included.
    fn sample_pairs() -> Vec<(f64, i64)> {
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut pairs = Vec::new();
        for i in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let cents = if i % 5 == 0 {
                0
            } else {
                (seed % 10_000_000) as i64
            };
            let dollars = (seed % 1_000_003) as f64 / 7.0;
            pairs.push((dollars, cents));
        }
        pairs
    }

    #[test]
    fn nonzero_cents_take_precedence() {
        for (dollars, cents) in sample_pairs() {
            let resolved = resolve_amount(dollars, cents);
            if cents != 0 {
                assert_eq!(resolved, cents as f64 / 100.0);
            } else {
                assert_eq!(resolved, dollars);
            }
        }
    }

    #[test]
    fn to_cents_round_trips_nonzero_cents() {
        for (dollars, cents) in sample_pairs() {
            if cents == 0 {
                continue;
            }
            assert_eq!(to_cents(resolve_amount(dollars, cents)), cents, "cents={cents}");
        }
    }

    #[test]
    fn to_cents_rounds_half_up_for_positive_values() {
        assert_eq!(to_cents(5.5), 550);
        assert_eq!(to_cents(0.125), 13);
        assert_eq!(to_cents(15.99), 1599);
        assert_eq!(to_cents(0.0), 0);
    }

    #[test]
    fn to_cents_rounds_the_written_decimal_not_the_binary_value() {
        assert_eq!(to_cents(1.005), 101);
        assert_eq!(to_cents(2.675), 268);
        assert_eq!(to_cents(1.115), 112);
        assert_eq!(to_cents(8.345), 835);
        assert_eq!(to_cents(-1.005), -101);
        assert_eq!(format_dollars(1.005), "$1.01");
        assert_eq!(outgoing_pair(1.005), (1.01, 101));
    }

    #[test]
    fn resolved_cents_falls_back_to_dollars() {
        assert_eq!(resolved_cents(12.34, 0), 1234);
        assert_eq!(resolved_cents(99.0, 550), 550);
    }

    #[test]
    fn stale_dollar_field_is_ignored() {
        let expense = Expense {
            amount: 5.0,
            amount_cents: 550,
            ..Expense::default()
        };
        assert_eq!(expense.resolved_amount(), 5.5);
        assert_eq!(expense.amount_in_cents(), 550);
    }

    #[test]
    fn formatting_uses_two_decimals() {
        assert_eq!(format_dollars(5.5), "$5.50");
        assert_eq!(format_cents(2149), "$21.49");
        assert_eq!(format_cents(-307), "-$3.07");
        assert_eq!(format_cents(7), "$0.07");
    }

    #[test]
    fn outgoing_pair_halves_agree() {
        let (dollars, cents) = outgoing_pair(7.004);
        assert_eq!(cents, 700);
        assert_eq!(dollars, 7.0);
    }
}
