//! Ledger Integration Module
//!
//! This module defines the boundary to the ledger that executes batches:
//! - Ledger: the submission and query interface
//! - MemoryLedger: deterministic in-process ledger for tests and dry runs
//! - RpcLedger: JSON-RPC wallet backend using atomic `wallet_sendCalls`
//! - events: the registry event shapes used to confirm predictions

pub mod events;
mod memory;
mod rpc;

pub use memory::{AttestationRecord, MemoryLedger, MemoryLedgerConfig, SchemaRecord, WorldState};
pub use rpc::RpcLedger;

use crate::{Call, Receipt, TxHandle, error::LedgerError};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256};

/// Submission and query interface of the ledger
///
/// A submitted batch executes atomically: either every call takes effect or
/// none does.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submit `calls` as one atomic transaction signed by `from`
    async fn submit(&self, from: Address, calls: &[Call]) -> Result<TxHandle, LedgerError>;

    /// Receipt of a submitted batch, or `None` while it is not final
    async fn receipt(&self, handle: &TxHandle) -> Result<Option<Receipt>, LedgerError>;

    /// Deployed code at `address`; empty when nothing is deployed there
    async fn code_at(&self, address: Address) -> Result<Bytes, LedgerError>;

    async fn schema_exists(&self, uid: H256) -> Result<bool, LedgerError>;

    /// Best estimate of the timestamp of the block that includes the next batch
    async fn next_timestamp(&self) -> Result<u64, LedgerError>;
}
