//! Performance fee calculation and revenue share splits for rented
//! strategies. Pure math, no store dependency.

use crate::domain::errors::IntentError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Revenue share term. `fee_rate` is a decimal rate (0.20 for 20%); the
/// `*_pct` fields are decimal fractions and must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RevenueShareTerm {
    pub fee_rate: Decimal,
    pub creator_pct: Decimal,
    pub platform_pct: Decimal,
    pub user_pct: Decimal,
}

/// Which P&L the fee is charged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeBasis {
    /// Fee only on positive net profit (clamped at zero).
    NetProfitPositive,
    /// Fee on net profit regardless of sign.
    NetProfit,
}

impl RevenueShareTerm {
    pub fn validate(&self) -> Result<(), IntentError> {
        if self.fee_rate < Decimal::ZERO {
            return Err(IntentError::NegativeFeeRate);
        }
        if self.creator_pct < Decimal::ZERO
            || self.platform_pct < Decimal::ZERO
            || self.user_pct < Decimal::ZERO
        {
            return Err(IntentError::BadRevenueSplit {
                total: -1.0,
            });
        }
        let total = self.creator_pct + self.platform_pct + self.user_pct;
        if (total - Decimal::ONE).abs() > dec!(0.000000001) {
            return Err(IntentError::BadRevenueSplit {
                total: total.to_f64().unwrap_or(f64::NAN),
            });
        }
        Ok(())
    }
}

/// Deterministic split of a fee amount by percentages. The user leg takes
/// the remainder so the three legs always sum to `fee_amount` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub creator_amount: Decimal,
    pub platform_amount: Decimal,
    pub user_amount: Decimal,
}

impl FeeSplit {
    pub fn total(&self) -> Decimal {
        self.creator_amount + self.platform_amount + self.user_amount
    }
}

/// Compute the performance fee for a period: `realized_pnl * fee_rate`,
/// with the basis optionally clamping losses to zero first.
pub fn compute_performance_fee(
    realized_pnl: Decimal,
    term: &RevenueShareTerm,
    basis: FeeBasis,
) -> Result<Decimal, IntentError> {
    term.validate()?;
    let basis_amount = match basis {
        FeeBasis::NetProfitPositive => realized_pnl.max(Decimal::ZERO),
        FeeBasis::NetProfit => realized_pnl,
    };
    Ok(basis_amount * term.fee_rate)
}

pub fn split_fee_amount(fee_amount: Decimal, term: &RevenueShareTerm) -> Result<FeeSplit, IntentError> {
    term.validate()?;
    let creator_amount = fee_amount * term.creator_pct;
    let platform_amount = fee_amount * term.platform_pct;
    Ok(FeeSplit {
        creator_amount,
        platform_amount,
        user_amount: fee_amount - creator_amount - platform_amount,
    })
}

/// Fee from a basis-points term (`revenue_share_bps` in 0..=10000), the
/// alternate term shape some marketplace listings carry.
pub fn compute_fee_from_bps(
    net_profit: Decimal,
    bps: u32,
    basis: FeeBasis,
) -> Result<Decimal, IntentError> {
    if bps > 10_000 {
        return Err(IntentError::NegativeFeeRate);
    }
    let basis_amount = match basis {
        FeeBasis::NetProfitPositive => net_profit.max(Decimal::ZERO),
        FeeBasis::NetProfit => net_profit,
    };
    Ok(basis_amount * Decimal::new(bps as i64, 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term() -> RevenueShareTerm {
        RevenueShareTerm {
            fee_rate: dec!(0.20),
            creator_pct: dec!(0.50),
            platform_pct: dec!(0.30),
            user_pct: dec!(0.20),
        }
    }

    #[test]
    fn test_fee_on_positive_profit() {
        let fee = compute_performance_fee(dec!(1000), &term(), FeeBasis::NetProfitPositive)
            .unwrap();
        assert_eq!(fee, dec!(200.00));
    }

    #[test]
    fn test_positive_basis_clamps_losses_to_zero() {
        let fee = compute_performance_fee(dec!(-500), &term(), FeeBasis::NetProfitPositive)
            .unwrap();
        assert_eq!(fee, dec!(0));

        let signed = compute_performance_fee(dec!(-500), &term(), FeeBasis::NetProfit).unwrap();
        assert_eq!(signed, dec!(-100.00));
    }

    #[test]
    fn test_split_sums_exactly_to_fee() {
        // A repeating-decimal split would drift without the remainder leg.
        let odd = RevenueShareTerm {
            fee_rate: dec!(0.20),
            creator_pct: dec!(0.333333333),
            platform_pct: dec!(0.333333333),
            user_pct: dec!(0.333333334),
        };
        let split = split_fee_amount(dec!(100), &odd).unwrap();
        assert_eq!(split.total(), dec!(100));
    }

    #[test]
    fn test_percentages_must_sum_to_one() {
        let bad = RevenueShareTerm {
            fee_rate: dec!(0.20),
            creator_pct: dec!(0.50),
            platform_pct: dec!(0.30),
            user_pct: dec!(0.30),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_negative_fee_rate_rejected() {
        let bad = RevenueShareTerm {
            fee_rate: dec!(-0.1),
            ..term()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_bps_fee() {
        let fee = compute_fee_from_bps(dec!(1000), 2000, FeeBasis::NetProfitPositive).unwrap();
        assert_eq!(fee, dec!(200.0000));
        assert!(compute_fee_from_bps(dec!(1000), 10_001, FeeBasis::NetProfit).is_err());
    }
}
