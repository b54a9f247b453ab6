//! Vault fee derivation service
//!
//! Periodically derives performance, withdrawal and deposit fees for
//! yield-vault strategies across many chains: batched multicall probes,
//! generation classification of the heterogeneous responses, canonical
//! normalization, and a refreshed cache served to callers.

pub mod classifier;
pub mod config;
pub mod error;
pub mod fee_batch;
pub mod normalizer;
pub mod persistence;
pub mod probe;
pub mod scheduler;
pub mod transport;
pub mod types;
pub mod vault_registry;

// Re-export commonly used types
pub use config::Config;
pub use error::{FeeServiceError, TransportError};
pub use scheduler::FeeService;
pub use types::{FeeBatchSplit, PerformanceFee, StrategyTarget, VaultFeeBreakdown};
