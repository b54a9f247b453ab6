//! Fee value normalization
//!
//! Converts raw on-chain fee integers into canonical decimal fractions
//! and applies the per-chain treasury/staker split to generations that
//! only report an undifferentiated house fee. All arithmetic stays in
//! `Decimal`; on-chain values routinely exceed the float-safe integer
//! range.

use ethereum_types::U256;
use rust_decimal::Decimal;

use crate::probe::FeeCategoryRaw;
use crate::types::{FeeBatchSplit, PerformanceFee};

/// Largest raw value we accept before declaring the response garbage.
/// 96 bits comfortably covers 1e18-scaled fractions.
const MAX_RAW_BITS: usize = 96;

pub fn decimal_from_u256(value: U256) -> Option<Decimal> {
    if value.bits() > MAX_RAW_BITS {
        return None;
    }
    Some(Decimal::from_i128_with_scale(value.as_u128() as i128, 0))
}

/// Normalize a fee encoded at 1e18 precision. The encoding splits the
/// divide into two 1e9 halves so intermediate products cannot overflow
/// on chain; mirroring it keeps the arithmetic bit-identical.
pub fn fraction_1e18(raw: U256) -> Option<Decimal> {
    let billion = Decimal::from(1_000_000_000u64);
    Some(decimal_from_u256(raw)? / billion / billion)
}

/// Normalize a basis-point fee over a 10000 denominator (deposit and
/// withdraw fees on aggregate-getter contracts).
pub fn fraction_bps(raw: U256) -> Option<Decimal> {
    Some(decimal_from_u256(raw)? / Decimal::from(10_000u64))
}

/// Ratio of two raw accessor values, `None` when the denominator is zero
/// or either side is out of range.
pub fn ratio(numerator: U256, denominator: U256) -> Option<Decimal> {
    let den = decimal_from_u256(denominator)?;
    if den.is_zero() {
        return None;
    }
    Some(decimal_from_u256(numerator)? / den)
}

/// Split an undifferentiated house fee between treasury and stakers.
pub fn split_house_fee(house: Decimal, split: &FeeBatchSplit) -> (Decimal, Decimal) {
    (split.treasury * house, split.stakers * house)
}

/// Canonical performance fee from an aggregate/breakdown fee category.
/// The category's `beefy` component is the house fee, so the chain split
/// applies; total, call and strategist come straight off the contract.
pub fn performance_from_category(
    category: &FeeCategoryRaw,
    split: &FeeBatchSplit,
) -> Option<PerformanceFee> {
    let house = fraction_1e18(category.beefy)?;
    let (treasury, stakers) = split_house_fee(house, split);
    Some(PerformanceFee {
        total: fraction_1e18(category.total)?,
        call: fraction_1e18(category.call)?,
        strategist: fraction_1e18(category.strategist)?,
        treasury,
        stakers,
    })
}
