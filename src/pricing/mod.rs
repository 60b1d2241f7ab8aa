//! Pricing for bookings.
//!
//! The platform keeps 10% of the teacher rate on top of the rate itself.
//! This is the only place the split is computed; the quote endpoint and the
//! settlement write path both go through it.

use serde::Serialize;

/// Platform fee in percent of the teacher rate
pub const PLATFORM_FEE_PERCENT: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PricingBreakdown {
    /// What the teacher receives (their rate, unchanged)
    pub teacher_amount: i64,
    /// round(rate * 0.10), half-up
    pub platform_fee: i64,
    /// What the student is charged
    pub student_amount: i64,
}

/// Compute the fee split for a whole-rupee teacher rate.
///
/// Integer arithmetic throughout; `student_amount` is always exactly
/// `teacher_amount + platform_fee`.
pub fn breakdown(teacher_rate: i64) -> PricingBreakdown {
    let platform_fee = platform_fee(teacher_rate);
    PricingBreakdown {
        teacher_amount: teacher_rate,
        platform_fee,
        student_amount: teacher_rate + platform_fee,
    }
}

/// round(rate * fee%/100) with half-up rounding, no floats.
pub fn platform_fee(teacher_rate: i64) -> i64 {
    (teacher_rate * PLATFORM_FEE_PERCENT + 50) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_is_ten_percent_rounded() {
        assert_eq!(platform_fee(500), 50);
        assert_eq!(platform_fee(0), 0);
        assert_eq!(platform_fee(1), 0); // 0.1 rounds down
        assert_eq!(platform_fee(5), 1); // 0.5 rounds up
        assert_eq!(platform_fee(999), 100); // 99.9 rounds up
        assert_eq!(platform_fee(1234), 123);
    }

    #[test]
    fn student_amount_is_rate_plus_fee() {
        for rate in [0, 1, 5, 499, 500, 750, 12345] {
            let p = breakdown(rate);
            assert_eq!(p.teacher_amount, rate);
            assert_eq!(p.student_amount, p.teacher_amount + p.platform_fee);
        }
    }

    #[test]
    fn reference_rate_500() {
        let p = breakdown(500);
        assert_eq!(p.platform_fee, 50);
        assert_eq!(p.student_amount, 550);
    }
}
