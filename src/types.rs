//! Core data model for vault fee derivation

use chrono::{DateTime, Utc};
use ethereum_types::H160;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One vault's fee-bearing strategy contract. Sourced from the vault
/// registry snapshot taken once per refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyTarget {
    pub vault_id: String,
    pub chain_id: u64,
    pub strategy: H160,
}

/// Per-chain treasury/staker revenue split.
///
/// Constructed only through [`FeeBatchSplit::from_treasury`] so that
/// `treasury + stakers == 1` holds exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBatchSplit {
    pub treasury: Decimal,
    pub stakers: Decimal,
}

impl FeeBatchSplit {
    pub fn from_treasury(treasury: Decimal) -> Self {
        Self {
            treasury,
            stakers: Decimal::ONE - treasury,
        }
    }
}

/// Canonical performance fee breakdown. All values are fractions of
/// assets under management per fee-triggering event.
///
/// `total` is generation-dependent: aggregate and breakdown generations
/// report it straight from the contract, legacy and maxi generations carry
/// a fixed historical constant. Callers must not assume `total` equals the
/// sum of the component fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceFee {
    pub total: Decimal,
    pub call: Decimal,
    pub strategist: Decimal,
    pub treasury: Decimal,
    pub stakers: Decimal,
}

/// Full fee breakdown for one vault.
///
/// `deposit` is `None` (not zero) when the generation cannot report it:
/// "no deposit fee" and "fee hardcoded elsewhere, not queryable" are
/// different answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultFeeBreakdown {
    pub performance: PerformanceFee,
    pub withdraw: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit: Option<Decimal>,
    pub last_updated: DateTime<Utc>,
}

/// Parse a `0x`-prefixed (or bare) hex address.
pub fn parse_address(s: &str) -> Option<H160> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw).ok()?;
    if bytes.len() != 20 {
        return None;
    }
    Some(H160::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn split_components_sum_to_one() {
        for t in [dec!(0), dec!(0.14), dec!(0.17), dec!(0.5), dec!(1)] {
            let split = FeeBatchSplit::from_treasury(t);
            assert_eq!(split.treasury + split.stakers, Decimal::ONE);
        }
    }

    #[test]
    fn address_parsing_accepts_both_prefixes() {
        let with = parse_address("0x5af0d9827e0c53e4799bb226655a1de152a425a5").unwrap();
        let without = parse_address("5af0d9827e0c53e4799bb226655a1de152a425a5").unwrap();
        assert_eq!(with, without);
        assert!(parse_address("0x1234").is_none());
        assert!(parse_address("not hex").is_none());
    }
}
