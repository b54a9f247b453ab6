//! Strategy generation classification
//!
//! Strategy contracts come in four historical generations distinguished
//! by which fee accessors they expose. Classification is a pure function
//! of the raw probe (plus the vault id for the maxi naming convention),
//! so re-running it on identical inputs always yields identical output.

use chrono::{DateTime, Utc};
use ethereum_types::U256;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;

use crate::config::MaxiConfig;
use crate::error::FeeServiceError;
use crate::normalizer::{
    fraction_bps, performance_from_category, ratio, split_house_fee,
};
use crate::probe::{AllFeesRaw, FeeCategoryRaw, RawFeeProbe};
use crate::types::{FeeBatchSplit, PerformanceFee, StrategyTarget, VaultFeeBreakdown};

/// Which generation a probe resolved to. Each variant carries only what
/// its generation guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// `allFees()` responded: one call covers performance, deposit and
    /// withdraw.
    Aggregate(AllFeesRaw),
    /// `getFees()` responded: performance only, withdraw reconstructed
    /// from legacy accessors, deposit not queryable.
    Breakdown(FeeCategoryRaw),
    /// Reserved maxi vault: fees come from the allow-list or the
    /// call-fee fallback, never from the generic accessors.
    Maxi,
    /// Oldest contracts: the split is reconstructed from individually
    /// named accessors via the shape table.
    Legacy,
}

/// Maxi vaults follow a reserved naming convention in the registry.
pub fn is_maxi_vault(vault_id: &str) -> bool {
    vault_id.ends_with("-maxi")
}

/// Resolve the generation for one probe. Allow-listed maxi strategies
/// win outright (their accessors are unreliable even when present), then
/// the getter generations in order, then the maxi naming fallback, then
/// legacy.
pub fn classify(target: &StrategyTarget, probe: &RawFeeProbe, maxi: &MaxiConfig) -> Generation {
    if maxi.overrides.contains_key(&target.strategy) {
        return Generation::Maxi;
    }
    if let Some(all) = probe.all_fees {
        return Generation::Aggregate(all);
    }
    if let Some(category) = probe.get_fees {
        return Generation::Breakdown(category);
    }
    if is_maxi_vault(&target.vault_id) {
        return Generation::Maxi;
    }
    Generation::Legacy
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comp {
    Call,
    Strategist,
    Beefy,
    Treasury,
    Rewards,
    Fee,
}

/// How a shape assigns the protocol share.
enum HouseRule {
    /// One component is the undifferentiated house fee; the chain split
    /// divides it between treasury and stakers.
    Component(Comp),
    /// The contract reports treasury and staker components itself; the
    /// chain split is not applied.
    Direct { treasury: Comp, stakers: Comp },
    /// House fee is whatever the fixed total leaves after call and
    /// strategist.
    Remainder,
}

/// One recognized legacy fee formula. `requires` lists the accessors
/// that must have responded (maxFee is always required); `total` is the
/// fixed historical fee level for contracts of that era, not a sum of
/// the components.
struct LegacyShape {
    name: &'static str,
    requires: &'static [Comp],
    strategist: Option<Comp>,
    house: HouseRule,
    total: Decimal,
}

/// Recognized shapes in precedence order; first full match wins, so the
/// more specific shapes must stay ahead of the ones they subsume.
static LEGACY_SHAPES: Lazy<Vec<LegacyShape>> = Lazy::new(|| {
    let standard = Decimal::new(45, 3); // 0.045
    vec![
        LegacyShape {
            name: "call+strategist+beefy",
            requires: &[Comp::Call, Comp::Strategist, Comp::Beefy],
            strategist: Some(Comp::Strategist),
            house: HouseRule::Component(Comp::Beefy),
            total: standard,
        },
        LegacyShape {
            name: "call+strategist+rewards+treasury",
            requires: &[Comp::Call, Comp::Strategist, Comp::Rewards, Comp::Treasury],
            strategist: Some(Comp::Strategist),
            house: HouseRule::Direct {
                treasury: Comp::Treasury,
                stakers: Comp::Rewards,
            },
            total: standard,
        },
        LegacyShape {
            name: "call+strategist+treasury",
            requires: &[Comp::Call, Comp::Strategist, Comp::Treasury],
            strategist: Some(Comp::Strategist),
            house: HouseRule::Component(Comp::Treasury),
            total: standard,
        },
        LegacyShape {
            name: "call+treasury+rewards",
            requires: &[Comp::Call, Comp::Treasury, Comp::Rewards],
            strategist: None,
            house: HouseRule::Direct {
                treasury: Comp::Treasury,
                stakers: Comp::Rewards,
            },
            total: standard,
        },
        LegacyShape {
            name: "call+rewards",
            requires: &[Comp::Call, Comp::Rewards],
            strategist: None,
            house: HouseRule::Component(Comp::Rewards),
            total: standard,
        },
        LegacyShape {
            name: "fee+call",
            requires: &[Comp::Fee, Comp::Call],
            strategist: None,
            house: HouseRule::Component(Comp::Fee),
            total: Decimal::new(5, 2), // 0.05, a different era
        },
        LegacyShape {
            name: "call-only",
            requires: &[Comp::Call],
            strategist: None,
            house: HouseRule::Remainder,
            total: standard,
        },
    ]
});

fn component(probe: &RawFeeProbe, comp: Comp) -> Option<U256> {
    match comp {
        Comp::Call => probe.call_fee,
        Comp::Strategist => probe.strategist_fee,
        Comp::Beefy => probe.beefy_fee,
        Comp::Treasury => probe.treasury_fee,
        Comp::Rewards => probe.rewards_fee,
        Comp::Fee => probe.fee,
    }
}

fn shape_matches(shape: &LegacyShape, probe: &RawFeeProbe) -> bool {
    probe.max_fee.is_some()
        && shape
            .requires
            .iter()
            .all(|c| component(probe, *c).is_some())
}

/// Evaluate one shape. Every component is a share of the declared
/// max-fee denominator, scaled by the shape's fixed total.
fn eval_shape(
    shape: &LegacyShape,
    probe: &RawFeeProbe,
    split: &FeeBatchSplit,
) -> Option<PerformanceFee> {
    let max_fee = probe.max_fee?;
    let share = |comp: Comp| -> Option<Decimal> {
        Some(shape.total * ratio(component(probe, comp)?, max_fee)?)
    };

    let call = share(Comp::Call)?;
    let strategist = match shape.strategist {
        Some(comp) => share(comp)?,
        None => Decimal::ZERO,
    };
    let (treasury, stakers) = match &shape.house {
        HouseRule::Component(comp) => split_house_fee(share(*comp)?, split),
        HouseRule::Direct { treasury, stakers } => (share(*treasury)?, share(*stakers)?),
        HouseRule::Remainder => split_house_fee(shape.total - call - strategist, split),
    };

    Some(PerformanceFee {
        total: shape.total,
        call,
        strategist,
        treasury,
        stakers,
    })
}

fn legacy_performance(
    target: &StrategyTarget,
    probe: &RawFeeProbe,
    split: &FeeBatchSplit,
) -> Result<PerformanceFee, FeeServiceError> {
    LEGACY_SHAPES
        .iter()
        .find(|shape| shape_matches(shape, probe))
        .and_then(|shape| {
            tracing::debug!(
                vault = %target.vault_id,
                shape = shape.name,
                "legacy fee shape matched"
            );
            eval_shape(shape, probe, split)
        })
        .ok_or_else(|| FeeServiceError::UnclassifiedStrategy {
            vault_id: target.vault_id.clone(),
        })
}

const MAXI_DEFAULT_CALL_DENOMINATOR: u64 = 1000;

/// Maxi performance fee: allow-listed strategies use their frozen
/// constants; anything else assumes the call fee is the entire fee,
/// normalized by the on-chain max-call-fee constant when present.
fn maxi_performance(
    target: &StrategyTarget,
    probe: &RawFeeProbe,
    split: &FeeBatchSplit,
    maxi: &MaxiConfig,
) -> Result<PerformanceFee, FeeServiceError> {
    if let Some(fixed) = maxi.overrides.get(&target.strategy) {
        let (treasury, stakers) = split_house_fee(fixed.house, split);
        return Ok(PerformanceFee {
            total: fixed.total,
            call: fixed.call,
            strategist: fixed.strategist,
            treasury,
            stakers,
        });
    }

    let call_fee = probe.call_fee.ok_or_else(|| FeeServiceError::UnclassifiedStrategy {
        vault_id: target.vault_id.clone(),
    })?;
    let denominator = probe
        .max_call_fee
        .filter(|d| !d.is_zero())
        .unwrap_or_else(|| U256::from(MAXI_DEFAULT_CALL_DENOMINATOR));
    let total = ratio(call_fee, denominator).ok_or_else(|| {
        FeeServiceError::UnclassifiedStrategy {
            vault_id: target.vault_id.clone(),
        }
    })?;
    Ok(PerformanceFee {
        total,
        call: total,
        strategist: Decimal::ZERO,
        treasury: Decimal::ZERO,
        stakers: Decimal::ZERO,
    })
}

/// Withdraw fee for non-aggregate generations. A paused strategy, or one
/// where either the fee accessor or its max denominator did not respond,
/// is defined to charge no withdrawal fee. That is policy, not missing
/// data.
fn legacy_withdraw_fee(probe: &RawFeeProbe) -> Decimal {
    if probe.paused == Some(true) {
        return Decimal::ZERO;
    }
    match (probe.withdrawal_fee, probe.withdrawal_max) {
        (Some(fee), Some(max)) => ratio(fee, max).unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

/// Derive the full canonical breakdown for one strategy from its probe
/// and the chain's treasury/staker split.
pub fn derive_breakdown(
    target: &StrategyTarget,
    probe: &RawFeeProbe,
    split: &FeeBatchSplit,
    maxi: &MaxiConfig,
    now: DateTime<Utc>,
) -> Result<VaultFeeBreakdown, FeeServiceError> {
    let unclassified = || FeeServiceError::UnclassifiedStrategy {
        vault_id: target.vault_id.clone(),
    };

    match classify(target, probe, maxi) {
        Generation::Aggregate(all) => Ok(VaultFeeBreakdown {
            performance: performance_from_category(&all.performance, split)
                .ok_or_else(|| unclassified())?,
            withdraw: fraction_bps(all.withdraw).ok_or_else(|| unclassified())?,
            deposit: Some(fraction_bps(all.deposit).ok_or_else(|| unclassified())?),
            last_updated: now,
        }),
        Generation::Breakdown(category) => Ok(VaultFeeBreakdown {
            performance: performance_from_category(&category, split).ok_or_else(|| unclassified())?,
            withdraw: legacy_withdraw_fee(probe),
            deposit: None,
            last_updated: now,
        }),
        Generation::Maxi => Ok(VaultFeeBreakdown {
            performance: maxi_performance(target, probe, split, maxi)?,
            withdraw: legacy_withdraw_fee(probe),
            deposit: None,
            last_updated: now,
        }),
        Generation::Legacy => Ok(VaultFeeBreakdown {
            performance: legacy_performance(target, probe, split)?,
            withdraw: legacy_withdraw_fee(probe),
            deposit: None,
            last_updated: now,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaxiFeeOverride;
    use ethereum_types::H160;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn no_maxi() -> MaxiConfig {
        MaxiConfig {
            overrides: HashMap::new(),
        }
    }

    fn target(vault_id: &str) -> StrategyTarget {
        StrategyTarget {
            vault_id: vault_id.to_string(),
            chain_id: 56,
            strategy: H160::repeat_byte(0xab),
        }
    }

    fn split_14() -> FeeBatchSplit {
        FeeBatchSplit::from_treasury(dec!(0.14))
    }

    fn legacy_probe() -> RawFeeProbe {
        RawFeeProbe {
            call_fee: Some(U256::from(500u64)),
            strategist_fee: Some(U256::zero()),
            beefy_fee: Some(U256::from(4000u64)),
            max_fee: Some(U256::from(10000u64)),
            ..Default::default()
        }
    }

    fn aggregate_probe() -> RawFeeProbe {
        RawFeeProbe {
            all_fees: Some(AllFeesRaw {
                performance: FeeCategoryRaw {
                    total: U256::from(50_000_000_000_000_000u64),
                    beefy: U256::from(40_000_000_000_000_000u64),
                    call: U256::from(5_000_000_000_000_000u64),
                    strategist: U256::from(5_000_000_000_000_000u64),
                },
                deposit: U256::from(100u64),
                withdraw: U256::zero(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn aggregate_generation_worked_example() {
        let breakdown = derive_breakdown(
            &target("cake-cakev2"),
            &aggregate_probe(),
            &split_14(),
            &no_maxi(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(breakdown.performance.total, dec!(0.05));
        assert_eq!(breakdown.deposit, Some(dec!(0.01)));
        assert_eq!(breakdown.withdraw, Decimal::ZERO);
    }

    #[test]
    fn legacy_generation_worked_example() {
        let breakdown = derive_breakdown(
            &target("cake-syrup"),
            &legacy_probe(),
            &split_14(),
            &no_maxi(),
            Utc::now(),
        )
        .unwrap();
        let perf = breakdown.performance;
        assert_eq!(perf.total, dec!(0.045));
        assert_eq!(perf.call, dec!(0.00225));
        assert_eq!(perf.strategist, Decimal::ZERO);
        // 0.045 * 0.14 * 4000/10000
        assert_eq!(perf.treasury, dec!(0.045) * dec!(0.14) * dec!(0.4));
        assert_eq!(perf.stakers, dec!(0.045) * dec!(0.86) * dec!(0.4));
        assert!(breakdown.deposit.is_none(), "deposit must be absent, not zero");
    }

    #[test]
    fn aggregate_takes_precedence_over_legacy_accessors() {
        let mut probe = aggregate_probe();
        let legacy = legacy_probe();
        probe.call_fee = legacy.call_fee;
        probe.strategist_fee = legacy.strategist_fee;
        probe.beefy_fee = legacy.beefy_fee;
        probe.max_fee = legacy.max_fee;
        assert!(matches!(
            classify(&target("cake-cakev2"), &probe, &no_maxi()),
            Generation::Aggregate(_)
        ));
        let breakdown =
            derive_breakdown(&target("cake-cakev2"), &probe, &split_14(), &no_maxi(), Utc::now())
                .unwrap();
        // aggregate total (0.05), never the legacy constant 0.045
        assert_eq!(breakdown.performance.total, dec!(0.05));
    }

    #[test]
    fn breakdown_generation_reconstructs_withdraw_from_legacy_accessors() {
        let probe = RawFeeProbe {
            get_fees: Some(FeeCategoryRaw {
                total: U256::from(95_000_000_000_000_000u64),
                beefy: U256::from(80_000_000_000_000_000u64),
                call: U256::from(5_000_000_000_000_000u64),
                strategist: U256::from(10_000_000_000_000_000u64),
            }),
            withdrawal_fee: Some(U256::from(10u64)),
            withdrawal_max: Some(U256::from(10000u64)),
            ..Default::default()
        };
        let breakdown =
            derive_breakdown(&target("eth-comp"), &probe, &split_14(), &no_maxi(), Utc::now())
                .unwrap();
        assert_eq!(breakdown.performance.total, dec!(0.095));
        assert_eq!(breakdown.withdraw, dec!(0.001));
        assert!(breakdown.deposit.is_none());
    }

    #[test]
    fn maxi_allow_list_wins_over_everything_in_the_probe() {
        let strategy = H160::repeat_byte(0xab);
        let maxi = MaxiConfig {
            overrides: HashMap::from([(
                strategy,
                MaxiFeeOverride {
                    total: dec!(0.05),
                    call: dec!(0.005),
                    strategist: Decimal::ZERO,
                    house: dec!(0.045),
                },
            )]),
        };
        // probe even has an aggregate response; the allow-list still wins
        let breakdown = derive_breakdown(
            &target("bifi-maxi"),
            &aggregate_probe(),
            &split_14(),
            &maxi,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(breakdown.performance.total, dec!(0.05));
        assert_eq!(breakdown.performance.call, dec!(0.005));
        assert_eq!(breakdown.performance.treasury, dec!(0.14) * dec!(0.045));
        assert_eq!(breakdown.performance.stakers, dec!(0.86) * dec!(0.045));
    }

    #[test]
    fn unlisted_maxi_falls_back_to_call_fee_over_max_call_fee() {
        let probe = RawFeeProbe {
            call_fee: Some(U256::from(45u64)),
            max_call_fee: Some(U256::from(900u64)),
            ..Default::default()
        };
        let breakdown =
            derive_breakdown(&target("bifi-maxi"), &probe, &split_14(), &no_maxi(), Utc::now())
                .unwrap();
        assert_eq!(breakdown.performance.total, dec!(0.05));
        assert_eq!(breakdown.performance.call, dec!(0.05));
        assert_eq!(breakdown.performance.treasury, Decimal::ZERO);
    }

    #[test]
    fn unlisted_maxi_defaults_the_call_denominator_to_1000() {
        let probe = RawFeeProbe {
            call_fee: Some(U256::from(45u64)),
            ..Default::default()
        };
        let breakdown =
            derive_breakdown(&target("bifi-maxi"), &probe, &split_14(), &no_maxi(), Utc::now())
                .unwrap();
        assert_eq!(breakdown.performance.total, dec!(0.045));
    }

    #[test]
    fn legacy_shape_matching_is_order_sensitive() {
        // satisfies both call+strategist+beefy and call+treasury+rewards
        let probe = RawFeeProbe {
            call_fee: Some(U256::from(2000u64)),
            strategist_fee: Some(U256::from(3000u64)),
            beefy_fee: Some(U256::from(5000u64)),
            treasury_fee: Some(U256::from(3000u64)),
            rewards_fee: Some(U256::from(5000u64)),
            max_fee: Some(U256::from(10000u64)),
            ..Default::default()
        };
        let breakdown =
            derive_breakdown(&target("eth-dai"), &probe, &split_14(), &no_maxi(), Utc::now())
                .unwrap();
        // shape 1 routes beefyFee through the chain split; the direct
        // treasury/rewards shape would report treasury = 0.045 * 0.3
        let expected_house = dec!(0.045) * dec!(0.5);
        assert_eq!(breakdown.performance.treasury, dec!(0.14) * expected_house);
        assert_eq!(breakdown.performance.stakers, dec!(0.86) * expected_house);
    }

    #[test]
    fn direct_shape_skips_the_chain_split() {
        let probe = RawFeeProbe {
            call_fee: Some(U256::from(500u64)),
            treasury_fee: Some(U256::from(3000u64)),
            rewards_fee: Some(U256::from(5000u64)),
            max_fee: Some(U256::from(10000u64)),
            ..Default::default()
        };
        let breakdown =
            derive_breakdown(&target("eth-dai"), &probe, &split_14(), &no_maxi(), Utc::now())
                .unwrap();
        assert_eq!(breakdown.performance.treasury, dec!(0.045) * dec!(0.3));
        assert_eq!(breakdown.performance.stakers, dec!(0.045) * dec!(0.5));
    }

    #[test]
    fn fee_call_shape_uses_the_five_percent_total() {
        let probe = RawFeeProbe {
            fee: Some(U256::from(400u64)),
            call_fee: Some(U256::from(100u64)),
            max_fee: Some(U256::from(500u64)),
            ..Default::default()
        };
        let breakdown =
            derive_breakdown(&target("one-bifi"), &probe, &split_14(), &no_maxi(), Utc::now())
                .unwrap();
        assert_eq!(breakdown.performance.total, dec!(0.05));
        assert_eq!(breakdown.performance.call, dec!(0.05) * dec!(0.2));
    }

    #[test]
    fn unmatched_legacy_probe_is_a_classification_failure() {
        let probe = RawFeeProbe {
            strategist_fee: Some(U256::from(500u64)),
            max_fee: Some(U256::from(10000u64)),
            ..Default::default()
        };
        let err = derive_breakdown(
            &target("eth-dai"),
            &probe,
            &split_14(),
            &no_maxi(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, FeeServiceError::UnclassifiedStrategy { .. }));
    }

    #[test]
    fn paused_strategy_charges_no_withdraw_fee() {
        let mut probe = legacy_probe();
        probe.withdrawal_fee = Some(U256::from(10u64));
        probe.withdrawal_max = Some(U256::from(10000u64));
        probe.paused = Some(true);
        let breakdown =
            derive_breakdown(&target("cake-syrup"), &probe, &split_14(), &no_maxi(), Utc::now())
                .unwrap();
        assert_eq!(breakdown.withdraw, Decimal::ZERO);
        probe.paused = Some(false);
        let breakdown =
            derive_breakdown(&target("cake-syrup"), &probe, &split_14(), &no_maxi(), Utc::now())
                .unwrap();
        assert_eq!(breakdown.withdraw, dec!(0.001));
    }

    #[test]
    fn unqueryable_withdraw_accessors_mean_zero_fee() {
        let probe = legacy_probe();
        let breakdown =
            derive_breakdown(&target("cake-syrup"), &probe, &split_14(), &no_maxi(), Utc::now())
                .unwrap();
        assert_eq!(breakdown.withdraw, Decimal::ZERO);
    }

    #[test]
    fn classification_is_idempotent() {
        let probe = legacy_probe();
        let now = Utc::now();
        let first =
            derive_breakdown(&target("cake-syrup"), &probe, &split_14(), &no_maxi(), now).unwrap();
        let second =
            derive_breakdown(&target("cake-syrup"), &probe, &split_14(), &no_maxi(), now).unwrap();
        assert_eq!(first, second);
    }
}
