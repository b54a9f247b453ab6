//! Vault fee service entry point
//!
//! Hydrates the fee caches from the snapshot store, loads per-chain
//! treasury splits, then runs the refresh scheduler until the process
//! exits. Results are read through the library surface; HTTP exposure
//! lives elsewhere.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vault_fee_service::persistence::SnapshotStore;
use vault_fee_service::transport::build_transports;
use vault_fee_service::vault_registry::HttpVaultRegistry;
use vault_fee_service::{Config, FeeService};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        chains = config.chains.len(),
        cycle_seconds = config.refresh.cycle_interval.as_secs(),
        "starting vault fee service"
    );

    let store = SnapshotStore::connect(config.redis_url.as_deref()).await;
    let registry = Arc::new(HttpVaultRegistry::new(&config.vault_registry_url)?);
    let transports = build_transports(&config);

    let service = Arc::new(FeeService::new(config, transports, registry, store));
    service.hydrate().await;

    service.run().await;
    Ok(())
}
