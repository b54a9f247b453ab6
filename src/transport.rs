//! Batched read-only contract call execution over Multicall3
//!
//! One `tryAggregate(false, calls)` round trip resolves a whole batch of
//! accessor probes; per-call failures come back as unsuccessful entries
//! instead of failing the aggregate. The trait seam exists so the refresh
//! pipeline can run against a mock transport in tests.

use async_trait::async_trait;
use ethereum_types::H160;
use once_cell::sync::Lazy;
use web3::ethabi::{Contract, Function, Token};
use web3::transports::Http;
use web3::types::{Bytes, CallRequest};
use web3::Web3;

use crate::error::{classify_web3_error, TransportError};

/// A single read-only call against one contract.
#[derive(Debug, Clone)]
pub struct ContractCall {
    pub target: H160,
    pub data: Vec<u8>,
}

/// Read-only call execution for one chain.
#[async_trait]
pub trait BatchCallTransport: Send + Sync {
    /// Execute all calls in one aggregated round trip. Each entry is the
    /// decoded return bytes, or `None` when that call failed or returned
    /// nothing (method not present on the contract).
    async fn try_aggregate(
        &self,
        calls: &[ContractCall],
    ) -> Result<Vec<Option<Vec<u8>>>, TransportError>;

    /// Execute a single plain `eth_call`.
    async fn call(&self, to: H160, data: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

const MULTICALL3_ABI: &str = r#"[
  {
    "name": "tryAggregate",
    "type": "function",
    "stateMutability": "view",
    "inputs": [
      { "name": "requireSuccess", "type": "bool" },
      {
        "name": "calls",
        "type": "tuple[]",
        "components": [
          { "name": "target", "type": "address" },
          { "name": "callData", "type": "bytes" }
        ]
      }
    ],
    "outputs": [
      {
        "name": "returnData",
        "type": "tuple[]",
        "components": [
          { "name": "success", "type": "bool" },
          { "name": "returnData", "type": "bytes" }
        ]
      }
    ]
  }
]"#;

static TRY_AGGREGATE: Lazy<Function> = Lazy::new(|| {
    Contract::load(MULTICALL3_ABI.as_bytes())
        .expect("static multicall ABI parses")
        .function("tryAggregate")
        .expect("tryAggregate present in static ABI")
        .clone()
});

/// web3-backed transport for one chain, routing batches through the
/// chain's Multicall3 deployment.
pub struct MulticallClient {
    web3: Web3<Http>,
    multicall: H160,
}

impl MulticallClient {
    pub fn connect(rpc_url: &str, multicall: H160) -> Result<Self, TransportError> {
        let http = Http::new(rpc_url).map_err(|e| classify_web3_error(&e))?;
        Ok(Self {
            web3: Web3::new(http),
            multicall,
        })
    }
}

fn encode_try_aggregate(calls: &[ContractCall]) -> Result<Vec<u8>, TransportError> {
    let tuples = calls
        .iter()
        .map(|c| Token::Tuple(vec![Token::Address(c.target), Token::Bytes(c.data.clone())]))
        .collect();
    TRY_AGGREGATE
        .encode_input(&[Token::Bool(false), Token::Array(tuples)])
        .map_err(|e| TransportError::Decode(e.to_string()))
}

/// Decode `tryAggregate` output into per-call optional return bytes. An
/// unsuccessful call or an empty return (selector hit a fallback) maps to
/// `None`.
fn decode_try_aggregate(output: &[u8]) -> Result<Vec<Option<Vec<u8>>>, TransportError> {
    let tokens = TRY_AGGREGATE
        .decode_output(output)
        .map_err(|e| TransportError::Decode(e.to_string()))?;
    let entries = match tokens.into_iter().next() {
        Some(Token::Array(entries)) => entries,
        _ => return Err(TransportError::Decode("unexpected tryAggregate shape".into())),
    };
    entries
        .into_iter()
        .map(|entry| match entry {
            Token::Tuple(fields) => {
                let mut fields = fields.into_iter();
                match (fields.next(), fields.next()) {
                    (Some(Token::Bool(success)), Some(Token::Bytes(data))) => {
                        if success && !data.is_empty() {
                            Ok(Some(data))
                        } else {
                            Ok(None)
                        }
                    }
                    _ => Err(TransportError::Decode("malformed result tuple".into())),
                }
            }
            _ => Err(TransportError::Decode("malformed result entry".into())),
        })
        .collect()
}

#[async_trait]
impl BatchCallTransport for MulticallClient {
    async fn try_aggregate(
        &self,
        calls: &[ContractCall],
    ) -> Result<Vec<Option<Vec<u8>>>, TransportError> {
        let data = encode_try_aggregate(calls)?;
        let request = CallRequest {
            to: Some(self.multicall),
            data: Some(Bytes(data)),
            ..Default::default()
        };
        let output = self
            .web3
            .eth()
            .call(request, None)
            .await
            .map_err(|e| classify_web3_error(&e))?;
        decode_try_aggregate(&output.0)
    }

    async fn call(&self, to: H160, data: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let request = CallRequest {
            to: Some(to),
            data: Some(Bytes(data)),
            ..Default::default()
        };
        let output = self
            .web3
            .eth()
            .call(request, None)
            .await
            .map_err(|e| classify_web3_error(&e))?;
        Ok(output.0)
    }
}

/// Build one multicall transport per configured chain. Chains without a
/// multicall entry point, or whose RPC endpoint fails to initialize, are
/// left out; the scheduler skips them with a warning.
pub fn build_transports(
    config: &crate::config::Config,
) -> std::collections::HashMap<u64, std::sync::Arc<dyn BatchCallTransport>> {
    let mut transports: std::collections::HashMap<u64, std::sync::Arc<dyn BatchCallTransport>> =
        std::collections::HashMap::new();
    for chain in &config.chains {
        let Some(multicall) = chain.multicall else {
            continue;
        };
        match MulticallClient::connect(&chain.rpc_url, multicall) {
            Ok(client) => {
                transports.insert(chain.chain_id, std::sync::Arc::new(client));
            }
            Err(e) => {
                tracing::warn!(chain = %chain.name, error = %e, "rpc endpoint rejected, chain disabled");
            }
        }
    }
    transports
}
