/// Timestamp rescaling between time bases.
use crate::models::rational::Rational;

/// Producer clock: 100-nanosecond ticks.
pub const CAPTURE_TIME_BASE: Rational = Rational::new(1, 10_000_000);

/// Container clock: milliseconds.
pub const MILLISECOND_TIME_BASE: Rational = Rational::new(1, 1_000);

/// Rescale `a` from time base `from` to time base `to`.
///
/// Computes `a * from.num * to.den / (from.den * to.num)` in 128-bit
/// arithmetic, rounding to nearest with ties away from zero. Results outside
/// the `i64` range saturate.
pub fn rescale(a: i64, from: Rational, to: Rational) -> i64 {
    let b = from.num as i128 * to.den as i128;
    let c = from.den as i128 * to.num as i128;
    if c == 0 {
        return if a == 0 || b == 0 { 0 } else if (a < 0) != (b < 0) { i64::MIN } else { i64::MAX };
    }

    let num = a as i128 * b;
    let negative = (num < 0) != (c < 0);
    let (num, c) = (num.abs(), c.abs());
    let q = (num + c / 2) / c;
    let q = if negative { -q } else { q };
    q.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Rescale a producer timestamp (100 ns ticks) into `to`.
pub fn from_capture_ticks(ticks: i64, to: Rational) -> i64 {
    rescale(ticks, CAPTURE_TIME_BASE, to)
}
