use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic 32-byte value mixed into a CREATE2 address derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Salt(pub [u8; 32]);

impl Salt {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_h256(&self) -> H256 {
        H256::from(self.0)
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_h256())
    }
}

/// A value a call either creates or depends on
///
/// Addresses are deployed contracts, identifiers are registry records
/// (schemas and attestations).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reference {
    Address(Address),
    Identifier(H256),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Address(address) => write!(f, "address {:?}", address),
            Reference::Identifier(uid) => write!(f, "identifier {:?}", uid),
        }
    }
}

/// One ledger-directed operation inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Human-readable step name, used in logs and error reports
    pub label: String,
    pub target: Address,
    pub payload: Bytes,
    pub value: U256,
    /// Values that exist on the ledger once this call has executed
    pub provides: Vec<Reference>,
    /// Values this call targets or embeds in its payload
    pub references: Vec<Reference>,
}

impl Call {
    /// Whether this call targets or embeds `reference`
    pub fn refers_to(&self, reference: &Reference) -> bool {
        self.references.contains(reference)
    }

    /// Whether this call brings `reference` into existence
    pub fn creates(&self, reference: &Reference) -> bool {
        self.provides.contains(reference)
    }
}

/// Opaque handle returned by the ledger for a submitted batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle(pub String);

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TxHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Final status of a submitted batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Event emitted while executing a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub emitter: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
}

/// Post-execution confirmation of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub handle: TxHandle,
    pub status: ReceiptStatus,
    pub block_number: u64,
    /// Events in emission order across all calls of the batch
    pub logs: Vec<LogEntry>,
}

impl Receipt {
    /// Whether every call of the batch executed
    pub fn succeeded(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

/// Content identifier plus the fixed-width digest referenced on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    pub cid: String,
    pub digest: H256,
}
