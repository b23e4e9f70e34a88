//! In-Memory Ledger
//!
//! A deterministic, single-process ledger implementing the [`Ledger`] trait.
//! It models the parts of the chain the orchestration engine depends on:
//!
//! - a CREATE2 factory taking `salt ‖ init_code`
//! - a schema registry and an attestation service with resolver, refUID,
//!   expiry and revocation checks
//! - core contracts emitting `PolicyRegistered` on `registerPolicy(address)`
//! - native balances moved by call values
//!
//! Batches execute against a copy of the world state that is only committed
//! when every call succeeds, so a reverted batch leaves no trace. Reverted
//! batches do not advance the block height, matching a wallet that refuses an
//! atomic batch whose simulation fails.
//!
//! ## Fault injection
//! Tests can reject the next submission, revert the next batch, revert calls
//! with a given selector, and delay or withhold receipts.
//!
//! NOT suitable for production: no persistence, no gas, no real EVM.

use super::{Ledger, events};
use crate::{
    Call, LogEntry, Receipt, ReceiptStatus, TxHandle,
    config::NetworkConfig,
    encode::abi,
    error::LedgerError,
};
use async_trait::async_trait;
use ethers::abi::{Token, encode_packed};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::{get_create2_address_from_hash, keccak256};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Addresses and clock of the in-memory ledger
#[derive(Debug, Clone)]
pub struct MemoryLedgerConfig {
    pub factory: Address,
    pub schema_registry: Address,
    pub eas: Address,
    pub genesis_timestamp: u64,
    pub block_time_secs: u64,
}

impl MemoryLedgerConfig {
    /// Ledger settings matching the contracts of `network`
    ///
    /// Block times below one second are raised to one so that every block has
    /// a distinct timestamp.
    pub fn from_network(network: &NetworkConfig) -> Self {
        Self {
            factory: network.factory,
            schema_registry: network.schema_registry,
            eas: network.eas,
            genesis_timestamp: 1_700_000_000,
            block_time_secs: network.block_time_secs.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRecord {
    pub uid: H256,
    pub resolver: Address,
    pub revocable: bool,
    pub schema: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationRecord {
    pub uid: H256,
    pub schema: H256,
    pub recipient: Address,
    pub attester: Address,
    pub time: u64,
    pub expiration_time: u64,
    /// Zero while the attestation is active
    pub revocation_time: u64,
    pub revocable: bool,
    pub ref_uid: H256,
    pub data: Bytes,
}

/// Everything a batch can change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldState {
    pub code: HashMap<Address, Bytes>,
    pub schemas: HashMap<H256, SchemaRecord>,
    pub attestations: HashMap<H256, AttestationRecord>,
    pub policies: HashMap<Address, Vec<Address>>,
    pub balances: HashMap<Address, U256>,
}

#[derive(Debug, Default)]
struct Faults {
    reject_next: bool,
    revert_next: bool,
    reverting_selectors: HashSet<[u8; 4]>,
    receipt_delay_polls: u32,
    withhold_receipts: bool,
}

#[derive(Debug)]
struct PendingReceipt {
    receipt: Receipt,
    polls_remaining: u32,
}

#[derive(Debug, Default)]
struct Inner {
    state: WorldState,
    block_number: u64,
    submissions: u64,
    receipts: HashMap<TxHandle, PendingReceipt>,
    faults: Faults,
}

/// Deterministic in-process ledger
#[derive(Debug)]
pub struct MemoryLedger {
    config: MemoryLedgerConfig,
    inner: RwLock<Inner>,
}

/// Context of the batch currently executing
struct Frame {
    from: Address,
    timestamp: u64,
    logs: Vec<LogEntry>,
}

impl MemoryLedger {
    /// Creates an empty ledger at block zero
    ///
    /// # Arguments
    /// * `config` - Contract addresses and block timing
    pub fn new(config: MemoryLedgerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn config(&self) -> &MemoryLedgerConfig {
        &self.config
    }

    /// Credit `amount` of native value to `account`
    pub async fn fund(&self, account: Address, amount: U256) {
        let mut inner = self.inner.write().await;
        let balance = inner.state.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Native balance of `account`, zero if never funded
    pub async fn balance_of(&self, account: Address) -> U256 {
        let inner = self.inner.read().await;
        inner.state.balances.get(&account).copied().unwrap_or_default()
    }

    /// Registered schema with `uid`, if any
    pub async fn schema(&self, uid: H256) -> Option<SchemaRecord> {
        self.inner.read().await.state.schemas.get(&uid).cloned()
    }

    /// Attestation with `uid`, if any
    ///
    /// Revoked attestations are still returned, with a non-zero
    /// `revocation_time`.
    pub async fn attestation(&self, uid: H256) -> Option<AttestationRecord> {
        self.inner.read().await.state.attestations.get(&uid).cloned()
    }

    /// Policies registered on the core contract `core`, in registration order
    pub async fn policies_of(&self, core: Address) -> Vec<Address> {
        let inner = self.inner.read().await;
        inner.state.policies.get(&core).cloned().unwrap_or_default()
    }

    /// Copy of the whole world state, for before/after comparisons
    pub async fn snapshot(&self) -> WorldState {
        self.inner.read().await.state.clone()
    }

    /// Number of submissions accepted so far, reverted ones included
    pub async fn submissions(&self) -> u64 {
        self.inner.read().await.submissions
    }

    /// Number of the last executed block; reverted batches do not advance it
    pub async fn block_number(&self) -> u64 {
        self.inner.read().await.block_number
    }

    /// The next submission fails as if the wallet holder declined it
    pub async fn reject_next_submission(&self) {
        self.inner.write().await.faults.reject_next = true;
    }

    /// The next accepted batch reverts regardless of its calls
    pub async fn revert_next_batch(&self) {
        self.inner.write().await.faults.revert_next = true;
    }

    /// Any call whose selector matches `signature` reverts
    pub async fn revert_selector(&self, signature: &str) {
        self.inner
            .write()
            .await
            .faults
            .reverting_selectors
            .insert(abi::selector(signature));
    }

    /// Receipts stay pending for `polls` queries before becoming visible
    pub async fn delay_receipts(&self, polls: u32) {
        self.inner.write().await.faults.receipt_delay_polls = polls;
    }

    /// Hide every receipt until called again with `false`
    pub async fn withhold_receipts(&self, withhold: bool) {
        self.inner.write().await.faults.withhold_receipts = withhold;
    }

    /// Remove every injected fault
    pub async fn clear_faults(&self) {
        self.inner.write().await.faults = Faults::default();
    }

    fn timestamp_of(&self, block_number: u64) -> u64 {
        self.config.genesis_timestamp + block_number * self.config.block_time_secs
    }

    fn execute(&self, state: &mut WorldState, frame: &mut Frame, call: &Call, reverting: &HashSet<[u8; 4]>) -> Result<(), String> {
        if call.payload.len() >= 4 {
            let selector = [call.payload[0], call.payload[1], call.payload[2], call.payload[3]];
            if reverting.contains(&selector) && call.target != self.config.factory {
                return Err("reverted by fault injection".to_string());
            }
        }

        if !call.value.is_zero() {
            transfer(state, frame.from, call.target, call.value)?;
        }
        if call.payload.is_empty() {
            return Ok(());
        }

        if call.target == self.config.factory {
            self.deploy(state, &call.payload)
        } else if call.target == self.config.schema_registry {
            self.register_schema(state, frame, &call.payload)
        } else if call.target == self.config.eas {
            self.attestation_call(state, frame, &call.payload)
        } else {
            contract_call(state, frame, call)
        }
    }

    fn deploy(&self, state: &mut WorldState, payload: &[u8]) -> Result<(), String> {
        if payload.len() <= 32 {
            return Err("factory: missing init code".to_string());
        }
        let (salt, init_code) = payload.split_at(32);
        let address = get_create2_address_from_hash(self.config.factory, salt.to_vec(), keccak256(init_code).to_vec());
        if state.code.contains_key(&address) {
            return Err(format!("factory: {:?} already deployed", address));
        }
        debug!("Deployed contract at {:?}", address);
        state.code.insert(address, Bytes::from(init_code.to_vec()));
        Ok(())
    }

    fn register_schema(&self, state: &mut WorldState, frame: &mut Frame, payload: &[u8]) -> Result<(), String> {
        let tokens = abi::decode_call(abi::REGISTER_SCHEMA, &abi::register_schema_params(), payload)
            .ok_or_else(|| "schema registry: unknown call".to_string())?;
        let [Token::String(schema), Token::Address(resolver), Token::Bool(revocable)] = tokens.as_slice() else {
            return Err("schema registry: malformed arguments".to_string());
        };

        let packed = encode_packed(&[
            Token::String(schema.clone()),
            Token::Address(*resolver),
            Token::Bool(*revocable),
        ])
        .map_err(|e| e.to_string())?;
        let uid = H256::from(keccak256(packed));
        if state.schemas.contains_key(&uid) {
            return Err("schema registry: AlreadyExists".to_string());
        }

        state.schemas.insert(
            uid,
            SchemaRecord {
                uid,
                resolver: *resolver,
                revocable: *revocable,
                schema: schema.clone(),
            },
        );
        frame.logs.push(events::schema_registered(
            self.config.schema_registry,
            uid,
            frame.from,
            *resolver,
            *revocable,
            schema,
        ));
        Ok(())
    }

    fn attestation_call(&self, state: &mut WorldState, frame: &mut Frame, payload: &[u8]) -> Result<(), String> {
        if let Some(tokens) = abi::decode_call(abi::ATTEST, &abi::attest_params(), payload) {
            return self.attest(state, frame, &tokens);
        }
        if let Some(tokens) = abi::decode_call(abi::REVOKE, &abi::revoke_params(), payload) {
            return self.revoke(state, frame, &tokens);
        }
        Err("attestation service: unknown call".to_string())
    }

    fn attest(&self, state: &mut WorldState, frame: &mut Frame, tokens: &[Token]) -> Result<(), String> {
        let malformed = || "attest: malformed arguments".to_string();
        let [Token::Tuple(outer)] = tokens else {
            return Err(malformed());
        };
        let [Token::FixedBytes(schema), Token::Tuple(request)] = outer.as_slice() else {
            return Err(malformed());
        };
        let [
            Token::Address(recipient),
            Token::Uint(expiration),
            Token::Bool(revocable),
            Token::FixedBytes(ref_uid),
            Token::Bytes(data),
            Token::Uint(_value),
        ] = request.as_slice()
        else {
            return Err(malformed());
        };

        let schema = H256::from_slice(schema);
        let ref_uid = H256::from_slice(ref_uid);
        let expiration_time = expiration.low_u64();

        let record = state
            .schemas
            .get(&schema)
            .ok_or_else(|| "attest: InvalidSchema".to_string())?;
        if expiration_time != 0 && expiration_time <= frame.timestamp {
            return Err("attest: InvalidExpirationTime".to_string());
        }
        if *revocable && !record.revocable {
            return Err("attest: Irrevocable".to_string());
        }
        if !ref_uid.is_zero() && !state.attestations.contains_key(&ref_uid) {
            return Err(format!("attest: refUID {:?} NotFound", ref_uid));
        }
        if !record.resolver.is_zero() && !state.code.contains_key(&record.resolver) {
            return Err(format!("attest: resolver {:?} has no code", record.resolver));
        }

        let mut bump: u32 = 0;
        let uid = loop {
            let packed = encode_packed(&[
                Token::FixedBytes(schema.as_bytes().to_vec()),
                Token::Address(*recipient),
                Token::Address(frame.from),
                Token::FixedBytes(frame.timestamp.to_be_bytes().to_vec()),
                Token::FixedBytes(expiration_time.to_be_bytes().to_vec()),
                Token::Bool(*revocable),
                Token::FixedBytes(ref_uid.as_bytes().to_vec()),
                Token::Bytes(data.clone()),
                Token::FixedBytes(bump.to_be_bytes().to_vec()),
            ])
            .map_err(|e| e.to_string())?;
            let candidate = H256::from(keccak256(packed));
            if !state.attestations.contains_key(&candidate) {
                break candidate;
            }
            bump += 1;
        };

        state.attestations.insert(
            uid,
            AttestationRecord {
                uid,
                schema,
                recipient: *recipient,
                attester: frame.from,
                time: frame.timestamp,
                expiration_time,
                revocation_time: 0,
                revocable: *revocable,
                ref_uid,
                data: Bytes::from(data.clone()),
            },
        );
        frame
            .logs
            .push(events::attested(self.config.eas, *recipient, frame.from, uid, schema));
        Ok(())
    }

    fn revoke(&self, state: &mut WorldState, frame: &mut Frame, tokens: &[Token]) -> Result<(), String> {
        let malformed = || "revoke: malformed arguments".to_string();
        let [Token::Tuple(outer)] = tokens else {
            return Err(malformed());
        };
        let [Token::FixedBytes(schema), Token::Tuple(request)] = outer.as_slice() else {
            return Err(malformed());
        };
        let [Token::FixedBytes(uid), Token::Uint(_value)] = request.as_slice() else {
            return Err(malformed());
        };
        let schema = H256::from_slice(schema);
        let uid = H256::from_slice(uid);

        let record = state
            .attestations
            .get_mut(&uid)
            .ok_or_else(|| format!("revoke: {:?} NotFound", uid))?;
        if record.schema != schema {
            return Err("revoke: InvalidSchema".to_string());
        }
        if record.attester != frame.from {
            return Err("revoke: AccessDenied".to_string());
        }
        if !record.revocable {
            return Err("revoke: Irrevocable".to_string());
        }
        if record.revocation_time != 0 {
            return Err("revoke: AlreadyRevoked".to_string());
        }
        record.revocation_time = frame.timestamp;

        let recipient = record.recipient;
        frame
            .logs
            .push(events::revoked(self.config.eas, recipient, frame.from, uid, schema));
        Ok(())
    }
}

fn transfer(state: &mut WorldState, from: Address, to: Address, amount: U256) -> Result<(), String> {
    let available = state.balances.get(&from).copied().unwrap_or_default();
    if available < amount {
        return Err(format!("insufficient balance: required {}, available {}", amount, available));
    }
    state.balances.insert(from, available - amount);
    let balance = state.balances.entry(to).or_default();
    *balance = balance.saturating_add(amount);
    Ok(())
}

fn contract_call(state: &mut WorldState, frame: &mut Frame, call: &Call) -> Result<(), String> {
    if !state.code.contains_key(&call.target) {
        return Err(format!("call to {:?} which has no code", call.target));
    }

    if let Some(tokens) = abi::decode_call(abi::REGISTER_POLICY, &abi::register_policy_params(), &call.payload) {
        let [Token::Address(policy)] = tokens.as_slice() else {
            return Err("registerPolicy: malformed arguments".to_string());
        };
        if !state.code.contains_key(policy) {
            return Err(format!("registerPolicy: policy {:?} has no code", policy));
        }
        let registered = state.policies.entry(call.target).or_default();
        if registered.contains(policy) {
            return Err("registerPolicy: already registered".to_string());
        }
        registered.push(*policy);
        frame.logs.push(events::policy_registered(call.target, *policy));
    }
    Ok(())
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn submit(&self, from: Address, calls: &[Call]) -> Result<TxHandle, LedgerError> {
        let mut inner = self.inner.write().await;

        if std::mem::take(&mut inner.faults.reject_next) {
            warn!("Submission from {:?} rejected", from);
            return Err(LedgerError::Rejected("user denied transaction signature".to_string()));
        }

        inner.submissions += 1;
        let block_number = inner.block_number + 1;
        let mut frame = Frame {
            from,
            timestamp: self.timestamp_of(block_number),
            logs: Vec::new(),
        };

        let mut state = inner.state.clone();
        let mut outcome = Ok(());
        if std::mem::take(&mut inner.faults.revert_next) {
            outcome = Err("batch reverted by fault injection".to_string());
        } else {
            for (index, call) in calls.iter().enumerate() {
                if let Err(reason) = self.execute(&mut state, &mut frame, call, &inner.faults.reverting_selectors) {
                    outcome = Err(format!("call #{} ({}): {}", index, call.label, reason));
                    break;
                }
            }
        }

        let mut seed = Vec::with_capacity(48);
        seed.extend_from_slice(from.as_bytes());
        seed.extend_from_slice(&inner.submissions.to_be_bytes());
        seed.extend_from_slice(&block_number.to_be_bytes());
        let handle = TxHandle(format!("{:?}", H256::from(keccak256(seed))));

        let receipt = match outcome {
            Ok(()) => {
                inner.state = state;
                inner.block_number = block_number;
                debug!("Batch {} executed {} calls in block {}", handle, calls.len(), block_number);
                Receipt {
                    handle: handle.clone(),
                    status: ReceiptStatus::Success,
                    block_number,
                    logs: frame.logs,
                }
            }
            Err(reason) => {
                warn!("Batch {} reverted: {}", handle, reason);
                Receipt {
                    handle: handle.clone(),
                    status: ReceiptStatus::Reverted,
                    block_number,
                    logs: Vec::new(),
                }
            }
        };

        let polls_remaining = inner.faults.receipt_delay_polls;
        inner.receipts.insert(handle.clone(), PendingReceipt { receipt, polls_remaining });
        Ok(handle)
    }

    async fn receipt(&self, handle: &TxHandle) -> Result<Option<Receipt>, LedgerError> {
        let mut inner = self.inner.write().await;
        let withhold = inner.faults.withhold_receipts;
        let pending = inner
            .receipts
            .get_mut(handle)
            .ok_or_else(|| LedgerError::UnknownHandle(handle.to_string()))?;

        if withhold {
            return Ok(None);
        }
        if pending.polls_remaining > 0 {
            pending.polls_remaining -= 1;
            return Ok(None);
        }
        Ok(Some(pending.receipt.clone()))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, LedgerError> {
        let inner = self.inner.read().await;
        Ok(inner.state.code.get(&address).cloned().unwrap_or_default())
    }

    async fn schema_exists(&self, uid: H256) -> Result<bool, LedgerError> {
        Ok(self.inner.read().await.state.schemas.contains_key(&uid))
    }

    async fn next_timestamp(&self) -> Result<u64, LedgerError> {
        let inner = self.inner.read().await;
        Ok(self.timestamp_of(inner.block_number + 1))
    }
}
