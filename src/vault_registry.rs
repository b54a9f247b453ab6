//! Vault registry client
//!
//! The registry is an external collaborator: one read-only snapshot of
//! vault → strategy targets per refresh cycle. Entries with malformed
//! strategy addresses are dropped with a warning rather than failing the
//! snapshot.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::error::FeeServiceError;
use crate::types::{parse_address, StrategyTarget};

#[async_trait]
pub trait VaultRegistry: Send + Sync {
    async fn list_vaults(&self) -> Result<Vec<StrategyTarget>, FeeServiceError>;
}

#[derive(Debug, Deserialize)]
struct VaultEntry {
    id: String,
    #[serde(alias = "chainId")]
    chain_id: u64,
    #[serde(alias = "strategyAddress")]
    strategy: String,
}

pub struct HttpVaultRegistry {
    client: reqwest::Client,
    url: String,
}

impl HttpVaultRegistry {
    pub fn new(url: &str) -> Result<Self, FeeServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FeeServiceError::Registry(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    async fn fetch(&self) -> Result<Vec<VaultEntry>, FeeServiceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeeServiceError::Registry(e.to_string()))?
            .error_for_status()
            .map_err(|e| FeeServiceError::Registry(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| FeeServiceError::Registry(e.to_string()))
    }
}

#[async_trait]
impl VaultRegistry for HttpVaultRegistry {
    async fn list_vaults(&self) -> Result<Vec<StrategyTarget>, FeeServiceError> {
        // one retry for transient registry hiccups, then let the cycle
        // proceed without a snapshot
        let entries = match self.fetch().await {
            Ok(entries) => entries,
            Err(first) => {
                warn!("vault registry fetch failed ({}), retrying once", first);
                self.fetch().await?
            }
        };

        let mut targets = Vec::with_capacity(entries.len());
        for entry in entries {
            match parse_address(&entry.strategy) {
                Some(strategy) => targets.push(StrategyTarget {
                    vault_id: entry.id,
                    chain_id: entry.chain_id,
                    strategy,
                }),
                None => warn!(
                    vault = %entry.id,
                    address = %entry.strategy,
                    "vault registry entry has malformed strategy address"
                ),
            }
        }
        Ok(targets)
    }
}
