use crate::{Salt, artifact::Artifact};
use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256, U256};
use std::fmt;
use std::sync::Arc;

/// Arguments of a registry `attest` call
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationRequest {
    pub schema: H256,
    pub recipient: Address,
    /// Zero means the attestation never expires
    pub expiration_time: u64,
    pub revocable: bool,
    /// UID of the attestation this one refers to, or zero
    pub ref_uid: H256,
    pub data: Bytes,
    pub value: U256,
}

/// A logical ledger operation, before encoding
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Deploy `artifact` through the deterministic factory
    Deploy {
        factory: Address,
        salt: Salt,
        artifact: Arc<Artifact>,
        args: Vec<Token>,
    },
    /// Register a schema whose resolver is a policy contract
    RegisterSchema {
        registry: Address,
        schema: String,
        resolver: Address,
        revocable: bool,
    },
    /// Register a policy contract against a core contract
    RegisterPolicy { core: Address, policy: Address },
    /// Create an attestation; `attester` and `time` only feed the UID prediction
    Attest {
        service: Address,
        attester: Address,
        time: u64,
        request: AttestationRequest,
    },
    Revoke {
        service: Address,
        schema: H256,
        uid: H256,
    },
    /// Call an arbitrary function on `target`
    Invoke {
        target: Address,
        signature: String,
        args: Vec<Token>,
        value: U256,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Deploy,
    RegisterSchema,
    RegisterPolicy,
    Attest,
    Revoke,
    Invoke,
}

impl Operation {
    /// Kind of the operation, without its arguments
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Deploy { .. } => OperationKind::Deploy,
            Operation::RegisterSchema { .. } => OperationKind::RegisterSchema,
            Operation::RegisterPolicy { .. } => OperationKind::RegisterPolicy,
            Operation::Attest { .. } => OperationKind::Attest,
            Operation::Revoke { .. } => OperationKind::Revoke,
            Operation::Invoke { .. } => OperationKind::Invoke,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Deploy => "deploy",
            OperationKind::RegisterSchema => "registerSchema",
            OperationKind::RegisterPolicy => "registerPolicy",
            OperationKind::Attest => "attest",
            OperationKind::Revoke => "revoke",
            OperationKind::Invoke => "invoke",
        };
        f.write_str(name)
    }
}
