//! Refresh scheduler and cache ownership
//!
//! One `FeeService` instance owns both cache maps and is their only
//! writer; readers get lock-free, possibly stale snapshots. Each cycle
//! fans out per chain, tolerates any chain or batch failing, merges what
//! succeeded key by key, persists once, and sleeps.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use rust_decimal::Decimal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::classifier::derive_breakdown;
use crate::config::{ChainConfig, Config};
use crate::error::FeeServiceError;
use crate::fee_batch;
use crate::persistence::{SnapshotKey, SnapshotStore};
use crate::probe::collect_probes;
use crate::transport::BatchCallTransport;
use crate::types::{FeeBatchSplit, StrategyTarget, VaultFeeBreakdown};
use crate::vault_registry::VaultRegistry;

/// Served when a vault has no cached breakdown yet.
pub fn default_total_performance_fee() -> Decimal {
    Decimal::new(95, 3)
}

/// Should this vault be re-derived this cycle? Entries inside the
/// staleness window are skipped; absent or expired ones are selected.
pub fn needs_refresh(
    entry: Option<&VaultFeeBreakdown>,
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> bool {
    match entry {
        Some(breakdown) => now - breakdown.last_updated > window,
        None => true,
    }
}

pub struct FeeService {
    config: Config,
    transports: HashMap<u64, Arc<dyn BatchCallTransport>>,
    registry: Arc<dyn VaultRegistry>,
    store: SnapshotStore,
    vault_fees: DashMap<String, VaultFeeBreakdown>,
    splits: DashMap<u64, FeeBatchSplit>,
}

impl FeeService {
    pub fn new(
        config: Config,
        transports: HashMap<u64, Arc<dyn BatchCallTransport>>,
        registry: Arc<dyn VaultRegistry>,
        store: SnapshotStore,
    ) -> Self {
        Self {
            config,
            transports,
            registry,
            store,
            vault_fees: DashMap::new(),
            splits: DashMap::new(),
        }
    }

    /// Rebuild both caches from the persisted snapshots. Called once at
    /// startup, before the first cycle.
    pub async fn hydrate(&self) {
        if let Some(fees) = self
            .store
            .get::<HashMap<String, VaultFeeBreakdown>>(SnapshotKey::vault_fees())
            .await
        {
            info!(vaults = fees.len(), "hydrated vault fees from snapshot");
            for (vault_id, breakdown) in fees {
                self.vault_fees.insert(vault_id, breakdown);
            }
        }
        if let Some(splits) = self
            .store
            .get::<HashMap<u64, FeeBatchSplit>>(SnapshotKey::treasury_splits())
            .await
        {
            info!(chains = splits.len(), "hydrated treasury splits from snapshot");
            for (chain_id, split) in splits {
                self.splits.insert(chain_id, split);
            }
        }
    }

    /// Instantaneous cache read; may serve stale data by design.
    pub fn vault_fees(&self) -> HashMap<String, VaultFeeBreakdown> {
        self.vault_fees
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn vault_fee(&self, vault_id: &str) -> Option<VaultFeeBreakdown> {
        self.vault_fees.get(vault_id).map(|entry| entry.value().clone())
    }

    /// Total performance fee for one vault, falling back to the global
    /// default when nothing is cached.
    pub fn total_performance_fee(&self, vault_id: &str) -> Decimal {
        self.vault_fees
            .get(vault_id)
            .map(|entry| entry.performance.total)
            .unwrap_or_else(default_total_performance_fee)
    }

    fn split_for(&self, chain_id: u64) -> FeeBatchSplit {
        self.splits
            .get(&chain_id)
            .map(|entry| *entry.value())
            .unwrap_or_else(|| FeeBatchSplit::from_treasury(self.config.splits.default_treasury))
    }

    /// Refresh every chain's treasury split and persist the result. Runs
    /// once at startup; splits change rarely enough that re-registry is
    /// an external trigger concern.
    pub async fn refresh_treasury_splits(&self) {
        fee_batch::refresh_splits(&self.config, &self.transports, &self.splits).await;
        let snapshot: HashMap<u64, FeeBatchSplit> = self
            .splits
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        if let Err(e) = self.store.set(SnapshotKey::treasury_splits(), &snapshot).await {
            warn!("treasury split snapshot write failed: {}", e);
        }
    }

    async fn refresh_chain(
        &self,
        chain: &ChainConfig,
        targets: Vec<StrategyTarget>,
    ) -> Result<Vec<(String, VaultFeeBreakdown)>, FeeServiceError> {
        let transport = self
            .transports
            .get(&chain.chain_id)
            .ok_or_else(|| FeeServiceError::Config(format!("no transport for {}", chain.name)))?;

        let probes =
            collect_probes(transport.as_ref(), &chain.name, &targets, chain.batch_size).await;
        let split = self.split_for(chain.chain_id);
        let now = Utc::now();

        let mut derived = Vec::with_capacity(probes.len());
        for (target, probe) in probes {
            match derive_breakdown(&target, &probe, &split, &self.config.maxi, now) {
                Ok(breakdown) => derived.push((target.vault_id, breakdown)),
                Err(e) => {
                    // previous cached value, if any, keeps serving
                    warn!(chain = %chain.name, error = %e, "fee derivation failed for vault");
                }
            }
        }
        Ok(derived)
    }

    /// One full refresh pass: snapshot the registry, fan out per chain,
    /// merge whatever succeeded, persist once after all chains settle.
    pub async fn run_cycle(&self) -> Result<(), FeeServiceError> {
        let started = Instant::now();
        let targets = self.registry.list_vaults().await?;
        let now = Utc::now();

        let mut by_chain: HashMap<u64, Vec<StrategyTarget>> = HashMap::new();
        for target in targets {
            by_chain.entry(target.chain_id).or_default().push(target);
        }

        let mut work: Vec<(&ChainConfig, Vec<StrategyTarget>)> = Vec::new();
        for chain in &self.config.chains {
            let Some(targets) = by_chain.remove(&chain.chain_id) else {
                continue;
            };
            if chain.multicall.is_none() {
                warn!(chain = %chain.name, "no multicall entry point, skipping chain");
                continue;
            }
            let stale: Vec<StrategyTarget> = targets
                .into_iter()
                .filter(|t| {
                    needs_refresh(
                        self.vault_fees.get(&t.vault_id).as_deref(),
                        now,
                        self.config.refresh.staleness_window,
                    )
                })
                .collect();
            if stale.is_empty() {
                debug!(chain = %chain.name, "all cached breakdowns fresh, nothing to do");
                continue;
            }
            work.push((chain, stale));
        }
        for chain_id in by_chain.keys() {
            warn!(chain_id = *chain_id, "registry lists vaults on an unconfigured chain");
        }

        let chains_attempted = work.len();
        let results = join_all(
            work.into_iter()
                .map(|(chain, targets)| async move {
                    (chain, self.refresh_chain(chain, targets).await)
                }),
        )
        .await;

        let mut refreshed = 0usize;
        let mut failed_chains = 0usize;
        for (chain, result) in results {
            match result {
                Ok(entries) => {
                    refreshed += entries.len();
                    for (vault_id, breakdown) in entries {
                        // per-key replacement keeps readers lock-free
                        self.vault_fees.insert(vault_id, breakdown);
                    }
                }
                Err(e) => {
                    failed_chains += 1;
                    warn!(chain = %chain.name, error = %e, "chain refresh failed, previous values retained");
                }
            }
        }

        let snapshot = self.vault_fees();
        self.store.set(SnapshotKey::vault_fees(), &snapshot).await?;

        info!(
            chains = chains_attempted,
            failed_chains,
            refreshed,
            cached = snapshot.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fee refresh cycle complete"
        );
        Ok(())
    }

    /// Drive cycles forever. Treasury splits load once before the first
    /// cycle; after that every tick is a vault fee pass.
    pub async fn run(self: Arc<Self>) {
        self.refresh_treasury_splits().await;

        let mut interval = tokio::time::interval(self.config.refresh.cycle_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = self.run_cycle().await {
                warn!("fee refresh cycle failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PerformanceFee;
    use rust_decimal_macros::dec;

    fn breakdown_at(last_updated: DateTime<Utc>) -> VaultFeeBreakdown {
        VaultFeeBreakdown {
            performance: PerformanceFee {
                total: dec!(0.045),
                call: dec!(0.005),
                strategist: Decimal::ZERO,
                treasury: dec!(0.01),
                stakers: dec!(0.03),
            },
            withdraw: Decimal::ZERO,
            deposit: None,
            last_updated,
        }
    }

    #[test]
    fn absent_entries_always_need_refresh() {
        assert!(needs_refresh(None, Utc::now(), chrono::Duration::hours(12)));
    }

    #[test]
    fn staleness_gate_boundary() {
        let now = Utc::now();
        let window = chrono::Duration::hours(12);
        let fresh = breakdown_at(now - chrono::Duration::hours(11));
        assert!(!needs_refresh(Some(&fresh), now, window));
        let just_past = breakdown_at(now - window - chrono::Duration::seconds(1));
        assert!(needs_refresh(Some(&just_past), now, window));
        let exactly_at = breakdown_at(now - window);
        assert!(!needs_refresh(Some(&exactly_at), now, window));
    }

    #[test]
    fn default_total_performance_fee_value() {
        assert_eq!(default_total_performance_fee(), dec!(0.095));
    }
}
