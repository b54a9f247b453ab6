//! Environment configuration for the fee refresh service

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use ethereum_types::H160;
use rust_decimal::Decimal;

use crate::error::FeeServiceError;
use crate::types::parse_address;

/// Canonical Multicall3 deployment, shared across almost every chain.
const MULTICALL3: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";
/// zkSync Era uses a chain-specific Multicall3 deployment.
const MULTICALL3_ZKSYNC: &str = "0xF9cda624FBC7e059355ce98a31693d299FACd963";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    pub redis_url: Option<String>,
    pub vault_registry_url: String,
    pub refresh: RefreshConfig,
    pub splits: SplitConfig,
    pub maxi: MaxiConfig,
}

/// One supported chain: RPC endpoint, aggregation entry point, fee
/// recipient contract and batching limits. A chain without a multicall
/// address is skipped by the scheduler (warned, not an error).
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub multicall: Option<H160>,
    pub fee_batch: Option<H160>,
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub cycle_interval: Duration,
    pub staleness_window: chrono::Duration,
}

/// Treasury/staker split behavior.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Historical default treasury numerator, applied when a chain's fee
    /// batch predates the `treasuryFee` accessor.
    pub default_treasury: Decimal,
    /// Temporary per-chain overrides for fee batches whose accessor cannot
    /// even be gas-estimated. Keyed by chain id.
    pub estimation_overrides: HashMap<u64, Decimal>,
}

/// Frozen historical maxi deployments whose on-chain accessors are
/// unreliable. Data maintenance lives here, not in the classifier.
#[derive(Debug, Clone)]
pub struct MaxiConfig {
    pub overrides: HashMap<H160, MaxiFeeOverride>,
}

/// Hand-coded fee constants for one allow-listed maxi strategy. `house`
/// is the undifferentiated protocol share, split by the chain's
/// treasury/staker ratio at derivation time.
#[derive(Debug, Clone, Copy)]
pub struct MaxiFeeOverride {
    pub total: Decimal,
    pub call: Decimal,
    pub strategist: Decimal,
    pub house: Decimal,
}

impl Config {
    /// Load configuration from environment, falling back to the baked-in
    /// chain table.
    pub fn from_env() -> Result<Self, FeeServiceError> {
        let cycle_seconds: u64 = env::var("FEE_CYCLE_SECONDS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| FeeServiceError::Config("invalid FEE_CYCLE_SECONDS".into()))?;
        let staleness_hours: i64 = env::var("FEE_STALENESS_HOURS")
            .unwrap_or_else(|_| "12".to_string())
            .parse()
            .map_err(|_| FeeServiceError::Config("invalid FEE_STALENESS_HOURS".into()))?;

        let redis_url = match env::var("REDIS_URL") {
            Ok(url) if !url.is_empty() => Some(url),
            _ => None,
        };

        Ok(Config {
            chains: default_chains(),
            redis_url,
            vault_registry_url: env::var("VAULT_REGISTRY_URL")
                .unwrap_or_else(|_| "https://api.beefy.finance/vaults".to_string()),
            refresh: RefreshConfig {
                cycle_interval: Duration::from_secs(cycle_seconds),
                staleness_window: chrono::Duration::hours(staleness_hours),
            },
            splits: SplitConfig {
                default_treasury: Decimal::new(14, 2),
                estimation_overrides: estimation_overrides(),
            },
            maxi: MaxiConfig {
                overrides: maxi_overrides(),
            },
        })
    }
}

fn rpc_url(name: &str, fallback: &str) -> String {
    env::var(format!("RPC_URL_{}", name.to_uppercase())).unwrap_or_else(|_| fallback.to_string())
}

fn chain(
    chain_id: u64,
    name: &str,
    default_rpc: &str,
    multicall: &str,
    fee_batch: Option<&str>,
    batch_size: usize,
) -> ChainConfig {
    ChainConfig {
        chain_id,
        name: name.to_string(),
        rpc_url: rpc_url(name, default_rpc),
        multicall: parse_address(multicall),
        fee_batch: fee_batch.and_then(parse_address),
        batch_size,
    }
}

/// Built-in chain table. RPC endpoints are overridable per chain through
/// `RPC_URL_<NAME>`; batch sizes below 100 mark chains whose public RPCs
/// reject large aggregate payloads.
fn default_chains() -> Vec<ChainConfig> {
    vec![
        chain(
            1,
            "ethereum",
            "https://eth.llamarpc.com",
            MULTICALL3,
            Some("0x3Cd5Ae887Ddf78c58c9C1a063EB343F942DbbcE8"),
            100,
        ),
        chain(
            10,
            "optimism",
            "https://mainnet.optimism.io",
            MULTICALL3,
            Some("0x26B4F4BDF7B9E730DD5EaB18d0A0A884c9913fB8"),
            100,
        ),
        chain(
            56,
            "bsc",
            "https://bsc-dataseed.bnbchain.org",
            MULTICALL3,
            Some("0xc4A23B8E6EB1Cd66E1D0D721a4Db7172dCBf26f1"),
            100,
        ),
        chain(
            137,
            "polygon",
            "https://polygon-rpc.com",
            MULTICALL3,
            Some("0x4Caf5e8Cbc373B73a10027f7fA08F22C5b9c8a07"),
            100,
        ),
        chain(
            250,
            "fantom",
            "https://rpc.ftm.tools",
            MULTICALL3,
            Some("0xc1Cf3d9BcC5D6dC8EEcf0f0a1A9e5b5C6D0E88f2"),
            50,
        ),
        chain(
            324,
            "zksync",
            "https://mainnet.era.zksync.io",
            MULTICALL3_ZKSYNC,
            Some("0xEA012f57AB4b5BbD6a2Ae94E5a1bE9E07f32b1fC"),
            25,
        ),
        chain(
            8453,
            "base",
            "https://mainnet.base.org",
            MULTICALL3,
            Some("0x02Ae4716B9D5d48Db1445814b0eDE39f5c28264B"),
            100,
        ),
        chain(
            42161,
            "arbitrum",
            "https://arb1.arbitrum.io/rpc",
            MULTICALL3,
            Some("0x5fE1b98Bd0a39Eb03a7a82F2eD4E2beD7eA1b6AE"),
            100,
        ),
        chain(
            43114,
            "avalanche",
            "https://api.avax.network/ext/bc/C/rpc",
            MULTICALL3,
            Some("0xA3e3Af161943CfB3941B631676134bb048739727"),
            100,
        ),
    ]
}

/// Treasury split overrides for chains where the fee batch accessor fails
/// gas estimation outright. Currently only zkSync Era, pending a fee batch
/// redeploy there.
fn estimation_overrides() -> HashMap<u64, Decimal> {
    HashMap::from([(324, Decimal::new(17, 2))])
}

/// Allow-listed maxi strategies with frozen fee constants. These are
/// historical deployments whose accessors either revert or report values
/// under different semantics; their economics were fixed at deploy time.
fn maxi_overrides() -> HashMap<H160, MaxiFeeOverride> {
    let mut map = HashMap::new();
    if let Some(addr) = parse_address("0x24AAaB9DA14308bAf9d670e2a37369FE8Cb5Fe36") {
        map.insert(
            addr,
            MaxiFeeOverride {
                total: Decimal::new(5, 2),
                call: Decimal::new(5, 3),
                strategist: Decimal::ZERO,
                house: Decimal::new(45, 3),
            },
        );
    }
    if let Some(addr) = parse_address("0x436D5127F16fAC1F021733dda090b5E6DE30b3bB") {
        map.insert(
            addr,
            MaxiFeeOverride {
                total: Decimal::new(1, 2),
                call: Decimal::new(1, 2),
                strategist: Decimal::ZERO,
                house: Decimal::ZERO,
            },
        );
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chain_table_is_well_formed() {
        let chains = default_chains();
        assert!(!chains.is_empty());
        for c in &chains {
            assert!(c.multicall.is_some(), "{} missing multicall", c.name);
            assert!(c.batch_size > 0 && c.batch_size <= 100);
        }
        // Chains known to reject large aggregate payloads stay bounded.
        let zksync = chains.iter().find(|c| c.chain_id == 324).unwrap();
        assert_eq!(zksync.batch_size, 25);
    }

    #[test]
    fn estimation_override_only_covers_special_cases() {
        let overrides = estimation_overrides();
        assert_eq!(overrides.get(&324), Some(&Decimal::new(17, 2)));
        assert!(!overrides.contains_key(&56));
    }
}
