//! JSON-RPC Ledger Module
//!
//! This module submits batches through a wallet's JSON-RPC endpoint using the
//! EIP-5792 call-batching methods:
//! - `wallet_sendCalls` with `atomicRequired`, returning a batch identifier
//! - `wallet_getCallsStatus`, polled for the receipts of that identifier
//!
//! Reads (`eth_getCode`, `eth_call`, latest block) go through the same
//! provider. Signing stays inside the wallet behind the endpoint.

use super::Ledger;
use crate::{
    Call, LogEntry, Receipt, ReceiptStatus, TxHandle,
    config::{NetworkConfig, RpcConfig},
    encode::abi,
    error::LedgerError,
};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider, ProviderError, RpcError};
use ethers::types::{
    Address, BlockNumber, Bytes, H256, TransactionRequest, U64, U256, transaction::eip2718::TypedTransaction,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// EIP-1193 error code for a request the user declined
const USER_REJECTED: i64 = 4001;

/// Ledger backed by a wallet JSON-RPC endpoint
///
/// Submissions are sent on behalf of the account given to `submit`; the
/// wallet must control that account and support atomic call batches.
#[derive(Debug, Clone)]
pub struct RpcLedger<P = Http> {
    provider: Provider<P>,
    /// Network addresses and block time
    network: NetworkConfig,
}

impl RpcLedger<Http> {
    /// Connect to the endpoint configured in `rpc`
    pub fn connect(rpc: &RpcConfig, network: NetworkConfig) -> Result<Self, LedgerError> {
        let provider =
            Provider::<Http>::try_from(rpc.url.as_str()).map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Self::new(provider, network))
    }
}

impl<P: JsonRpcClient> RpcLedger<P> {
    /// Creates a ledger over an existing provider
    ///
    /// # Arguments
    /// * `provider` - JSON-RPC provider of a wallet that supports EIP-5792
    /// * `network` - Registry addresses and block time of the chain
    pub fn new(provider: Provider<P>, network: NetworkConfig) -> Self {
        Self { provider, network }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendCallsParams {
    version: &'static str,
    chain_id: U64,
    from: Address,
    atomic_required: bool,
    calls: Vec<RpcCall>,
}

#[derive(Debug, Serialize)]
struct RpcCall {
    to: Address,
    data: Bytes,
    value: U256,
}

#[derive(Debug, Serialize, Deserialize)]
struct SendCallsResult {
    id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallsStatus {
    status: u16,
    #[serde(default)]
    receipts: Vec<CallsReceipt>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallsReceipt {
    #[serde(default)]
    logs: Vec<RpcLog>,
    block_number: U64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RpcLog {
    address: Address,
    topics: Vec<H256>,
    data: Bytes,
}

fn classify(err: ProviderError) -> LedgerError {
    if let Some(response) = err.as_error_response() {
        if response.code == USER_REJECTED {
            return LedgerError::Rejected(response.message.clone());
        }
    }
    LedgerError::Transport(err.to_string())
}

/// Convert a `wallet_getCallsStatus` result into a receipt
///
/// Status codes: 1xx pending, 200 confirmed, 4xx batch not included,
/// 5xx reverted, 600 partially reverted.
fn to_receipt(handle: &TxHandle, status: CallsStatus) -> Result<Option<Receipt>, LedgerError> {
    let block_number = status
        .receipts
        .iter()
        .map(|r| r.block_number.as_u64())
        .max()
        .unwrap_or_default();

    match status.status {
        100..=199 => Ok(None),
        200 => Ok(Some(Receipt {
            handle: handle.clone(),
            status: ReceiptStatus::Success,
            block_number,
            logs: status
                .receipts
                .into_iter()
                .flat_map(|r| r.logs)
                .map(|log| LogEntry {
                    emitter: log.address,
                    topics: log.topics,
                    data: log.data,
                })
                .collect(),
        })),
        400..=699 => {
            if status.status == 600 {
                warn!("Batch {} reported a partial revert despite atomic submission", handle);
            }
            Ok(Some(Receipt {
                handle: handle.clone(),
                status: ReceiptStatus::Reverted,
                block_number,
                logs: Vec::new(),
            }))
        }
        other => Err(LedgerError::Transport(format!("unexpected calls status {}", other))),
    }
}

#[async_trait]
impl<P: JsonRpcClient + 'static> Ledger for RpcLedger<P> {
    async fn submit(&self, from: Address, calls: &[Call]) -> Result<TxHandle, LedgerError> {
        let params = SendCallsParams {
            version: "2.0.0",
            chain_id: U64::from(self.network.chain_id),
            from,
            atomic_required: true,
            calls: calls
                .iter()
                .map(|call| RpcCall {
                    to: call.target,
                    data: call.payload.clone(),
                    value: call.value,
                })
                .collect(),
        };

        let result: SendCallsResult = self
            .provider
            .request("wallet_sendCalls", [params])
            .await
            .map_err(classify)?;
        debug!("Submitted {} calls as batch {}", calls.len(), result.id);
        Ok(TxHandle(result.id))
    }

    async fn receipt(&self, handle: &TxHandle) -> Result<Option<Receipt>, LedgerError> {
        let status: CallsStatus = self
            .provider
            .request("wallet_getCallsStatus", [handle.0.as_str()])
            .await
            .map_err(classify)?;
        to_receipt(handle, status)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, LedgerError> {
        self.provider.get_code(address, None).await.map_err(classify)
    }

    async fn schema_exists(&self, uid: H256) -> Result<bool, LedgerError> {
        let data = abi::encode_call(abi::GET_SCHEMA, &[Token::FixedBytes(uid.as_bytes().to_vec())]);
        let request: TypedTransaction = TransactionRequest::new()
            .to(self.network.schema_registry)
            .data(data)
            .into();
        let output = self.provider.call(&request, None).await.map_err(classify)?;

        // The record starts with its own uid, which is zero for unknown schemas
        Ok(output.len() >= 64 && output[32..64].iter().any(|b| *b != 0))
    }

    async fn next_timestamp(&self) -> Result<u64, LedgerError> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(classify)?
            .ok_or_else(|| LedgerError::Transport("latest block unavailable".to_string()))?;
        Ok(block.timestamp.as_u64() + self.network.block_time_secs)
    }
}
