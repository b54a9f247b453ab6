//! Typed errors for the fee derivation pipeline

use thiserror::Error;

/// Failures surfaced by the batched call transport.
///
/// The variants matter: the fee batch registry dispatches on the failure
/// signature (reverted accessor vs. gas estimation vs. plain RPC trouble)
/// to decide between the historical default, a chain override, or keeping
/// the previously cached value.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("call reverted: {0}")]
    Reverted(String),

    #[error("gas estimation failed: {0}")]
    GasEstimation(String),

    #[error("rpc failure: {0}")]
    Rpc(String),

    #[error("response decode failed: {0}")]
    Decode(String),
}

/// Service-level error taxonomy. Nothing here is process-fatal: every
/// variant degrades to "serve the previously cached value".
#[derive(Debug, Error)]
pub enum FeeServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no recognized fee shape for vault {vault_id}")]
    UnclassifiedStrategy { vault_id: String },

    #[error("vault registry error: {0}")]
    Registry(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Map a raw web3 error onto the transport taxonomy by its failure
/// signature. Node implementations disagree on revert phrasing, so this
/// matches the common substrings seen across geth, erigon and the various
/// L2 sequencer RPCs.
pub fn classify_web3_error(err: &web3::Error) -> TransportError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("revert") || lower.contains("invalid opcode") || lower.contains("abi") {
        TransportError::Reverted(msg)
    } else if lower.contains("cannot estimate") || lower.contains("gas required exceeds") {
        TransportError::GasEstimation(msg)
    } else {
        TransportError::Rpc(msg)
    }
}
