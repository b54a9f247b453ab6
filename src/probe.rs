//! Remote state batcher for strategy fee accessors
//!
//! Every strategy is probed with the union of fee accessor names seen
//! across all historical contract generations; a contract simply not
//! having a method is recorded as an absent result, never an error. Only
//! a whole-batch transport failure drops strategies, and only the ones in
//! that batch.

use ethereum_types::U256;
use futures::future::join_all;
use once_cell::sync::Lazy;
use tracing::warn;
use web3::signing::keccak256;

use crate::transport::{BatchCallTransport, ContractCall};
use crate::types::StrategyTarget;

/// Raw performance fee category as returned by `getFees`-generation
/// contracts (and nested inside `allFees`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeCategoryRaw {
    pub total: U256,
    pub beefy: U256,
    pub call: U256,
    pub strategist: U256,
}

/// Raw aggregate getter response: performance category plus deposit and
/// withdraw fees in basis points over 10000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllFeesRaw {
    pub performance: FeeCategoryRaw,
    pub deposit: U256,
    pub withdraw: U256,
}

/// One strategy's raw multi-method probe result. Each field is present
/// when the accessor decoded, absent when the method is unsupported or
/// the call reverted. Spelling variants (`withdrawalFee` vs
/// `WITHDRAW_FEE` and friends) are merged during assembly, first variant
/// in table order wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeeProbe {
    pub all_fees: Option<AllFeesRaw>,
    pub get_fees: Option<FeeCategoryRaw>,
    pub strategist_fee: Option<U256>,
    pub call_fee: Option<U256>,
    pub fee: Option<U256>,
    pub beefy_fee: Option<U256>,
    pub treasury_fee: Option<U256>,
    pub rewards_fee: Option<U256>,
    pub max_fee: Option<U256>,
    pub max_call_fee: Option<U256>,
    pub withdrawal_fee: Option<U256>,
    pub withdrawal_max: Option<U256>,
    pub paused: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeField {
    AllFees,
    GetFees,
    StrategistFee,
    CallFee,
    Fee,
    BeefyFee,
    TreasuryFee,
    RewardsFee,
    MaxFee,
    MaxCallFee,
    WithdrawalFee,
    WithdrawalMax,
    Paused,
}

struct FeeMethod {
    selector: [u8; 4],
    field: ProbeField,
}

fn method(signature: &str, field: ProbeField) -> FeeMethod {
    let hash = keccak256(signature.as_bytes());
    FeeMethod {
        selector: [hash[0], hash[1], hash[2], hash[3]],
        field,
    }
}

/// The accessor superset, ordered. Aliases for the same canonical field
/// must appear in precedence order since assembly keeps the first decoded
/// variant.
static FEE_METHODS: Lazy<Vec<FeeMethod>> = Lazy::new(|| {
    use ProbeField::*;
    vec![
        method("allFees()", AllFees),
        method("getFees()", GetFees),
        method("strategistFee()", StrategistFee),
        method("STRATEGIST_FEE()", StrategistFee),
        method("callFee()", CallFee),
        method("CALL_FEE()", CallFee),
        method("fee()", Fee),
        method("beefyFee()", BeefyFee),
        method("treasuryFee()", TreasuryFee),
        method("TREASURY_FEE()", TreasuryFee),
        method("rewardsFee()", RewardsFee),
        method("REWARDS_FEE()", RewardsFee),
        method("maxFee()", MaxFee),
        method("MAX_FEE()", MaxFee),
        method("maxCallFee()", MaxCallFee),
        method("withdrawalFee()", WithdrawalFee),
        method("WITHDRAWAL_FEE()", WithdrawalFee),
        method("withdrawFee()", WithdrawalFee),
        method("WITHDRAW_FEE()", WithdrawalFee),
        method("withdrawalMax()", WithdrawalMax),
        method("WITHDRAWAL_MAX()", WithdrawalMax),
        method("withdrawMax()", WithdrawalMax),
        method("WITHDRAW_MAX()", WithdrawalMax),
        method("paused()", Paused),
    ]
});

fn word(data: &[u8], index: usize) -> Option<U256> {
    data.get(index * 32..(index + 1) * 32)
        .map(U256::from_big_endian)
}

fn decode_uint(data: &[u8]) -> Option<U256> {
    word(data, 0)
}

fn decode_bool(data: &[u8]) -> Option<bool> {
    word(data, 0).map(|w| !w.is_zero())
}

fn decode_category_at(data: &[u8], index: usize) -> Option<FeeCategoryRaw> {
    Some(FeeCategoryRaw {
        total: word(data, index)?,
        beefy: word(data, index + 1)?,
        call: word(data, index + 2)?,
        strategist: word(data, index + 3)?,
    })
}

/// Decode a standalone `getFees()` response. Early fee configurators
/// return the four uints inline; later ones carry a label string and an
/// active flag, which makes the struct dynamic and prefixes an offset.
fn decode_category(data: &[u8]) -> Option<FeeCategoryRaw> {
    let words = data.len() / 32;
    match words {
        0..=3 => None,
        4 => decode_category_at(data, 0),
        _ => {
            let offset = word(data, 0)?;
            if offset > U256::from(data.len()) {
                return None;
            }
            decode_category_at(data, offset.as_usize() / 32)
        }
    }
}

/// Decode an `allFees()` response, handling both the fully inline layout
/// (six words) and the dynamic layout where the performance category
/// carries a label.
fn decode_all_fees(data: &[u8]) -> Option<AllFeesRaw> {
    let words = data.len() / 32;
    if words == 6 {
        return Some(AllFeesRaw {
            performance: decode_category_at(data, 0)?,
            deposit: word(data, 4)?,
            withdraw: word(data, 5)?,
        });
    }
    if words < 9 {
        return None;
    }
    let offset = word(data, 0)?;
    if offset > U256::from(data.len()) {
        return None;
    }
    Some(AllFeesRaw {
        performance: decode_category_at(data, offset.as_usize() / 32)?,
        deposit: word(data, 1)?,
        withdraw: word(data, 2)?,
    })
}

impl RawFeeProbe {
    fn record(&mut self, field: ProbeField, data: &[u8]) {
        match field {
            ProbeField::AllFees => {
                if self.all_fees.is_none() {
                    self.all_fees = decode_all_fees(data);
                }
            }
            ProbeField::GetFees => {
                if self.get_fees.is_none() {
                    self.get_fees = decode_category(data);
                }
            }
            ProbeField::StrategistFee => merge(&mut self.strategist_fee, data),
            ProbeField::CallFee => merge(&mut self.call_fee, data),
            ProbeField::Fee => merge(&mut self.fee, data),
            ProbeField::BeefyFee => merge(&mut self.beefy_fee, data),
            ProbeField::TreasuryFee => merge(&mut self.treasury_fee, data),
            ProbeField::RewardsFee => merge(&mut self.rewards_fee, data),
            ProbeField::MaxFee => merge(&mut self.max_fee, data),
            ProbeField::MaxCallFee => merge(&mut self.max_call_fee, data),
            ProbeField::WithdrawalFee => merge(&mut self.withdrawal_fee, data),
            ProbeField::WithdrawalMax => merge(&mut self.withdrawal_max, data),
            ProbeField::Paused => {
                if self.paused.is_none() {
                    self.paused = decode_bool(data);
                }
            }
        }
    }
}

fn merge(slot: &mut Option<U256>, data: &[u8]) {
    if slot.is_none() {
        *slot = decode_uint(data);
    }
}

/// Probe every target on one chain, partitioned into bounded batches run
/// concurrently. A failed batch is logged and skipped; siblings are
/// unaffected. Returns one probe per target that survived its batch.
pub async fn collect_probes(
    transport: &dyn BatchCallTransport,
    chain_name: &str,
    targets: &[StrategyTarget],
    batch_size: usize,
) -> Vec<(StrategyTarget, RawFeeProbe)> {
    let batch_size = batch_size.max(1);
    let batches: Vec<&[StrategyTarget]> = targets.chunks(batch_size).collect();

    let futures = batches.iter().map(|batch| {
        let calls: Vec<ContractCall> = batch
            .iter()
            .flat_map(|target| {
                FEE_METHODS.iter().map(move |m| ContractCall {
                    target: target.strategy,
                    data: m.selector.to_vec(),
                })
            })
            .collect();
        async move { transport.try_aggregate(&calls).await }
    });

    let mut probes = Vec::with_capacity(targets.len());
    for (index, (batch, result)) in batches.iter().zip(join_all(futures).await).enumerate() {
        match result {
            Ok(results) => {
                for (target, chunk) in batch.iter().zip(results.chunks(FEE_METHODS.len())) {
                    let mut probe = RawFeeProbe::default();
                    for (m, data) in FEE_METHODS.iter().zip(chunk) {
                        if let Some(data) = data {
                            probe.record(m.field, data);
                        }
                    }
                    probes.push(((*target).clone(), probe));
                }
            }
            Err(err) => {
                warn!(
                    chain = chain_name,
                    batch = index,
                    strategies = batch.len(),
                    error = %err,
                    "fee probe batch failed, skipping its strategies this cycle"
                );
            }
        }
    }
    probes
}
