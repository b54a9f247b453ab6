//! Per-chain treasury/staker split registry
//!
//! Each chain's fee batch (fee recipient) contract exposes a
//! `treasuryFee()` numerator in parts-per-1000. Splits change far less
//! often than vault fees, so this refreshes on its own cadence: once at
//! startup, re-triggered externally thereafter.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use ethereum_types::U256;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use web3::signing::keccak256;

use crate::config::Config;
use crate::error::TransportError;
use crate::transport::BatchCallTransport;
use crate::types::FeeBatchSplit;

const SPLIT_DENOMINATOR: u64 = 1000;

fn treasury_fee_selector() -> Vec<u8> {
    keccak256(b"treasuryFee()")[..4].to_vec()
}

fn decode_split(data: &[u8]) -> Option<FeeBatchSplit> {
    let word = data.get(..32)?;
    let numerator = U256::from_big_endian(word);
    if numerator > U256::from(SPLIT_DENOMINATOR) {
        return None;
    }
    let treasury = Decimal::from(numerator.as_u64()) / Decimal::from(SPLIT_DENOMINATOR);
    Some(FeeBatchSplit::from_treasury(treasury))
}

/// Refresh the treasury split for every configured chain. Failure
/// handling per failure signature:
///
/// - accessor absent (no fee batch address, revert, ABI mismatch): the
///   fixed historical default applies;
/// - gas estimation impossible on a chain listed in the estimation
///   overrides: the documented temporary override applies;
/// - anything else: keep the previously cached split rather than
///   overwrite it with a bad value.
pub async fn refresh_splits(
    config: &Config,
    transports: &HashMap<u64, Arc<dyn BatchCallTransport>>,
    splits: &DashMap<u64, FeeBatchSplit>,
) {
    let default = FeeBatchSplit::from_treasury(config.splits.default_treasury);
    let selector = treasury_fee_selector();

    for chain in &config.chains {
        let Some(fee_batch) = chain.fee_batch else {
            debug!(chain = %chain.name, "no fee batch contract, using historical default split");
            splits.insert(chain.chain_id, default);
            continue;
        };
        let Some(transport) = transports.get(&chain.chain_id) else {
            continue;
        };

        match transport.call(fee_batch, selector.clone()).await {
            Ok(data) => match decode_split(&data) {
                Some(split) => {
                    debug!(chain = %chain.name, treasury = %split.treasury, "treasury split refreshed");
                    splits.insert(chain.chain_id, split);
                }
                None => {
                    warn!(
                        chain = %chain.name,
                        "fee batch returned an out-of-range treasury numerator, keeping prior split"
                    );
                }
            },
            Err(TransportError::Reverted(_)) | Err(TransportError::Decode(_)) => {
                // older fee batch without the accessor
                debug!(chain = %chain.name, "treasuryFee accessor unavailable, using historical default");
                splits.insert(chain.chain_id, default);
            }
            Err(TransportError::GasEstimation(msg)) => {
                if let Some(treasury) = config.splits.estimation_overrides.get(&chain.chain_id) {
                    info!(
                        chain = %chain.name,
                        treasury = %treasury,
                        "applying documented split override while estimation fails"
                    );
                    splits.insert(chain.chain_id, FeeBatchSplit::from_treasury(*treasury));
                } else {
                    warn!(chain = %chain.name, error = %msg, "split refresh failed, keeping prior value");
                }
            }
            Err(err) => {
                warn!(chain = %chain.name, error = %err, "split refresh failed, keeping prior value");
            }
        }
    }
}
