//! Redis-backed snapshot persistence
//!
//! Both caches are persisted as whole-object JSON snapshots, written once
//! per refresh cycle and read back once at startup. When Redis is
//! unreachable the store degrades to a no-op and the service runs
//! cache-only.

use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use crate::error::FeeServiceError;

/// Snapshot key names. Two keys total: vault fee breakdowns and treasury
/// splits.
pub struct SnapshotKey;

impl SnapshotKey {
    pub fn vault_fees() -> &'static str {
        "fees:vaults"
    }

    pub fn treasury_splits() -> &'static str {
        "fees:treasury-splits"
    }
}

/// Key-value snapshot store with a disabled mode.
pub struct SnapshotStore {
    client: Option<Client>,
}

impl SnapshotStore {
    /// Connect to Redis, degrading to a disabled store if the backend is
    /// unreachable. A missing URL means persistence was deliberately
    /// turned off.
    pub async fn connect(redis_url: Option<&str>) -> Self {
        let Some(url) = redis_url else {
            info!("snapshot store disabled, running cache-only");
            return Self { client: None };
        };

        match Client::open(url) {
            Ok(client) => match client.get_async_connection().await {
                Ok(_) => {
                    info!("connected to snapshot store");
                    Self {
                        client: Some(client),
                    }
                }
                Err(e) => {
                    warn!("snapshot store unreachable ({}), running cache-only", e);
                    Self { client: None }
                }
            },
            Err(e) => {
                warn!("invalid snapshot store url ({}), running cache-only", e);
                Self { client: None }
            }
        }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    /// Read a full snapshot. Absent key or disabled store both come back
    /// as `None`.
    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let client = self.client.as_ref()?;
        let mut conn = match client.get_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("snapshot read connection failed for {}: {}", key, e);
                return None;
            }
        };
        let raw: Option<String> = match conn.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("snapshot read failed for {}: {}", key, e);
                return None;
            }
        };
        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("stale snapshot for {} failed to deserialize: {}", key, e);
                None
            }
        }
    }

    /// Write a full snapshot. Failures are reported, never fatal; the
    /// next cycle rewrites the whole object anyway.
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), FeeServiceError>
    where
        T: Serialize,
    {
        let Some(client) = self.client.as_ref() else {
            return Ok(());
        };
        let data = serde_json::to_string(value)
            .map_err(|e| FeeServiceError::Persistence(e.to_string()))?;
        let mut conn = client
            .get_async_connection()
            .await
            .map_err(|e| FeeServiceError::Persistence(e.to_string()))?;
        conn.set::<_, _, ()>(key, data)
            .await
            .map_err(|e| FeeServiceError::Persistence(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn disabled_store_reads_nothing_and_accepts_writes() {
        let store = SnapshotStore::disabled();
        let value: Option<HashMap<String, u64>> = store.get(SnapshotKey::vault_fees()).await;
        assert!(value.is_none());
        let snapshot: HashMap<String, u64> = HashMap::from([("a".into(), 1)]);
        assert!(store.set(SnapshotKey::vault_fees(), &snapshot).await.is_ok());
    }

    #[test]
    fn snapshot_keys_are_stable() {
        assert_eq!(SnapshotKey::vault_fees(), "fees:vaults");
        assert_eq!(SnapshotKey::treasury_splits(), "fees:treasury-splits");
    }
}
