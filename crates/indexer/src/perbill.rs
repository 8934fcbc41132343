//! Parts-per-billion fixed point used to split era rewards without floating point.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

const BILLION: u32 = 1_000_000_000;

/// Fraction in `[0, 1]` stored as parts per billion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Perbill(u32);

impl Perbill {
    pub const ZERO: Perbill = Perbill(0);
    pub const ONE: Perbill = Perbill(BILLION);

    /// Clamps to `[0, 1e9]`.
    pub fn from_parts(parts: i64) -> Self {
        Perbill(parts.clamp(0, BILLION as i64) as u32)
    }

    pub fn deconstruct(self) -> u32 {
        self.0
    }

    /// `p / q` rounded down to parts per billion.
    ///
    /// `q <= 0` is treated as 1, `p` is clamped to `[0, q]`. Both operands are divided by
    /// `q / u32::MAX + 1` first so the scaled numerator stays within 64 bits.
    pub fn from_rational_approximation(p: &BigInt, q: &BigInt) -> Self {
        let q = if q.is_positive() { q.clone() } else { BigInt::from(1) };
        let p = if p.is_negative() {
            BigInt::zero()
        } else if *p > q {
            q.clone()
        } else {
            p.clone()
        };

        let factor: BigInt = &q / BigInt::from(u32::MAX) + BigInt::from(1);
        let p_reduced: BigInt = &p / &factor;
        let q_reduced: BigInt = &q / &factor;
        if q_reduced.is_zero() {
            return Perbill::ZERO;
        }
        let parts: BigInt = p_reduced * BigInt::from(BILLION) / q_reduced;
        Perbill(parts.to_u32().unwrap_or(BILLION).min(BILLION))
    }

    /// `amount * self`, rounding the sub-billion remainder half up. The sign of `amount` is
    /// kept.
    pub fn mul(self, amount: &BigInt) -> BigInt {
        let (sign, magnitude) = (amount.sign(), amount.magnitude());
        let billion = BigUint::from(BILLION);
        let parts = BigUint::from(self.0);

        let whole: BigUint = (magnitude / &billion) * &parts;
        let rem_product: BigUint = (magnitude % &billion) * &parts;
        let mut rest: BigUint = &rem_product / &billion;
        let remainder: BigUint = &rem_product % &billion;
        if remainder * 2u32 >= billion {
            rest += 1u32;
        }

        let result: BigUint = whole + rest;
        if sign == Sign::Minus {
            -BigInt::from(result)
        } else {
            BigInt::from(result)
        }
    }
}

impl fmt::Display for Perbill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ppb", self.0)
    }
}

/// One validator's share of an era payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EraPayout {
    /// Validator's fraction of the era's reward points.
    pub total_reward_part: Perbill,
    /// Validator's cut of the era payout (commission plus what stakers share).
    pub total_payout: BigInt,
    pub commission: BigInt,
    pub leftover_for_stakers: BigInt,
}

impl EraPayout {
    pub fn compute(
        reward_points: u64,
        total_reward_points: u64,
        era_payout: &BigInt,
        commission: Perbill,
    ) -> Self {
        let total_reward_part = Perbill::from_rational_approximation(
            &BigInt::from(reward_points),
            &BigInt::from(total_reward_points),
        );
        let total_payout = total_reward_part.mul(era_payout);
        let commission = commission.mul(&total_payout);
        let leftover_for_stakers: BigInt = &total_payout - &commission;
        Self {
            total_reward_part,
            total_payout,
            commission,
            leftover_for_stakers,
        }
    }

    /// Reward owed to a staker with `stake` out of `total_stake` backing the validator.
    pub fn staker_share(&self, stake: &BigInt, total_stake: &BigInt) -> BigInt {
        Perbill::from_rational_approximation(stake, total_stake).mul(&self.leftover_for_stakers)
    }

    /// Commission plus the validator's share for its own stake.
    pub fn validator_reward(&self, own_stake: &BigInt, total_stake: &BigInt) -> BigInt {
        let own_share: BigInt = self.staker_share(own_stake, total_stake);
        &self.commission + own_share
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big(n: i64) -> BigInt {
        BigInt::from(n)
    }

    #[test]
    fn from_parts_clamps() {
        assert_eq!(Perbill::from_parts(-5), Perbill::ZERO);
        assert_eq!(Perbill::from_parts(2_000_000_000), Perbill::ONE);
        assert_eq!(Perbill::from_parts(42).deconstruct(), 42);
    }

    #[test]
    fn rational_approximation() {
        assert_eq!(Perbill::from_rational_approximation(&big(1), &big(3)).deconstruct(), 333_333_333);
        assert_eq!(Perbill::from_rational_approximation(&big(0), &big(3)), Perbill::ZERO);
        assert_eq!(Perbill::from_rational_approximation(&big(3), &big(3)), Perbill::ONE);
        assert_eq!(Perbill::from_rational_approximation(&big(9), &big(3)), Perbill::ONE);
        assert_eq!(Perbill::from_rational_approximation(&big(-1), &big(3)), Perbill::ZERO);
    }

    #[test]
    fn non_positive_denominator_is_one() {
        assert_eq!(Perbill::from_rational_approximation(&big(1), &big(0)), Perbill::ONE);
        assert_eq!(Perbill::from_rational_approximation(&big(0), &big(-7)), Perbill::ZERO);
    }

    #[test]
    fn rational_approximation_handles_huge_operands() {
        let q: BigInt = "1000000000000000000000000000".parse().unwrap();
        let p: BigInt = "250000000000000000000000000".parse().unwrap();
        // Pre-scaling truncates, so the result may land one part low.
        assert_eq!(Perbill::from_rational_approximation(&p, &q).deconstruct(), 249_999_999);
    }

    #[test]
    fn rational_approximation_is_monotonic() {
        let q = big(7_919);
        let mut last = Perbill::ZERO;
        for p in 0..=7_919 {
            let current = Perbill::from_rational_approximation(&big(p), &q);
            assert!(current >= last, "p={p}");
            last = current;
        }
        assert_eq!(last, Perbill::ONE);
    }

    #[test]
    fn mul_exact_half() {
        assert_eq!(Perbill::from_parts(500_000_000).mul(&big(500)), big(250));
    }

    #[test]
    fn mul_rounds_half_up() {
        assert_eq!(Perbill::from_parts(333_333_333).mul(&big(5_000_000)), big(1_666_667));
        // 0.5 * 3 = 1.5
        assert_eq!(Perbill::from_parts(500_000_000).mul(&big(3)), big(2));
        // 0.333333333 * 1 rounds to 0
        assert_eq!(Perbill::from_parts(333_333_333).mul(&big(1)), big(0));
    }

    #[test]
    fn mul_keeps_sign_and_large_amounts() {
        assert_eq!(Perbill::from_parts(500_000_000).mul(&big(-500)), big(-250));
        let amount: BigInt = "123456789012345678901234567890".parse().unwrap();
        assert_eq!(Perbill::ONE.mul(&amount), amount);
        assert_eq!(Perbill::ZERO.mul(&amount), BigInt::zero());
    }

    #[test]
    fn era_payout_split() {
        // 25% of the points, 1_000_000 era payout, 10% commission.
        let payout = EraPayout::compute(250, 1_000, &big(1_000_000), Perbill::from_parts(100_000_000));
        assert_eq!(payout.total_reward_part.deconstruct(), 250_000_000);
        assert_eq!(payout.total_payout, big(250_000));
        assert_eq!(payout.commission, big(25_000));
        assert_eq!(payout.leftover_for_stakers, big(225_000));

        assert_eq!(payout.staker_share(&big(1), &big(4)), big(56_250));
        assert_eq!(payout.validator_reward(&big(1), &big(4)), big(81_250));
    }

    #[test]
    fn era_payout_with_no_points() {
        let payout = EraPayout::compute(0, 0, &big(1_000_000), Perbill::from_parts(100_000_000));
        assert_eq!(payout.total_payout, BigInt::zero());
        assert_eq!(payout.leftover_for_stakers, BigInt::zero());
    }
}
