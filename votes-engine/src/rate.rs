//! Upvote-rate calculator.

/// Computes the upvote rate from the two counters, rounded to two decimal
/// digits.
///
/// A total of zero substitutes a base of 1, so an entity with no votes has a
/// rate of exactly 0.0 and no division by zero can occur. Rounding policy is
/// half-to-even, applied uniformly everywhere a rate is derived.
pub fn upvote_rate(up_count: i64, down_count: i64) -> f64 {
    let total = up_count + down_count;
    let base = if total == 0 { 1 } else { total };
    ((up_count as f64 / base as f64) * 100.0).round_ties_even() / 100.0
}
