//! Arbitrary-precision tick arithmetic and fixed-point ratios.
//!
//! A "tick" is one unit of time x capacity (core-seconds, host-seconds,
//! VM-seconds). For a multi-year trace over 200 000 hosts these products
//! overflow 64-bit integers, so every accumulator is a `BigInt`. Ratios of
//! accumulators are reported as `BigDecimal` with a fixed scale and half-up
//! rounding.

use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::BigInt;
use num_traits::{One, Zero};

use crate::types::SimTime;

/// Decimal scale used for all reported ratios.
pub const RATIO_SCALE: i64 = 10;

/// Product of a time difference and an integer capacity, as a `BigInt`.
pub fn ticks(timediff: SimTime, units: i64) -> BigInt {
    BigInt::from(timediff) * units
}

/// `num / den` at scale [`RATIO_SCALE`], rounded half-up.
pub fn ratio(num: &BigInt, den: &BigInt) -> BigDecimal {
    let num = BigDecimal::from(num.clone());
    let den = BigDecimal::from(den.clone());
    (num / den).with_scale_round(RATIO_SCALE, RoundingMode::HalfUp)
}

/// Like [`ratio`], but an empty denominator yields the conventional 1.
pub fn ratio_or_one(num: &BigInt, den: &BigInt) -> BigDecimal {
    if den.is_zero() {
        one()
    } else {
        ratio(num, den)
    }
}

/// Ratio of two plain counts at the reporting scale.
pub fn count_ratio(num: i64, den: i64) -> BigDecimal {
    ratio(&BigInt::from(num), &BigInt::from(den))
}

/// Decimal 1 at the reporting scale.
pub fn one() -> BigDecimal {
    BigDecimal::one().with_scale(RATIO_SCALE)
}

/// Decimal 0 at the reporting scale.
pub fn zero() -> BigDecimal {
    BigDecimal::zero().with_scale(RATIO_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_products_exceed_u64() {
        // 20 years of seconds times 32 cores times 200k hosts
        let per_host = ticks(631_152_000, 32);
        let mut total = BigInt::zero();
        for _ in 0..200_000 {
            total += &per_host;
        }
        assert!(total > BigInt::from(u64::MAX));
    }

    #[test]
    fn test_ratio_scale_and_rounding() {
        let r = count_ratio(1, 3);
        assert_eq!(r.to_string(), "0.3333333333");

        let r = count_ratio(2, 3);
        assert_eq!(r.to_string(), "0.6666666667");
    }

    #[test]
    fn test_ratio_or_one_empty_denominator() {
        let r = ratio_or_one(&BigInt::from(5), &BigInt::zero());
        assert_eq!(r, one());
    }

    #[test]
    fn test_exact_half() {
        // 0.00000000005 rounds up to 0.0000000001
        let r = ratio(&BigInt::from(1), &BigInt::from(20_000_000_000i64));
        assert_eq!(r.to_string(), "0.0000000001");
    }
}
