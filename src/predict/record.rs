//! Prediction Record
//!
//! The values a workflow predicted while building its batch, in the order they
//! were computed. Later calls look their dependencies up here by label; a
//! lookup for a value that was never predicted is a `MissingDependency`.

use crate::{Reference, error::OrchestrationError};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

/// What kind of ledger object a prediction stands for, and how it is confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionKind {
    /// Contract deployed through the factory; confirmed by code at the address
    Deployment,
    /// Schema record; confirmed by the registry's `Registered` event
    Schema,
    /// Attestation; confirmed by the service's `Attested` event
    Attestation { schema: H256 },
    /// Revocation of an existing attestation; confirmed by `Revoked`
    Revocation { schema: H256 },
    /// Policy registered on a core contract; confirmed by `PolicyRegistered`
    PolicyRegistration { policy: Address },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionStatus {
    /// Created by the batch being built
    Pending,
    /// Already present on the ledger; no call creates it
    Existing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub kind: PredictionKind,
    pub reference: Reference,
    pub status: PredictionStatus,
}

impl Prediction {
    /// Whether the batch under construction is expected to create this value
    pub fn is_pending(&self) -> bool {
        self.status == PredictionStatus::Pending
    }
}

/// Insertion-ordered predictions of one workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predictions {
    entries: Vec<Prediction>,
}

impl Predictions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a prediction, replacing any earlier one with the same label
    pub fn record(
        &mut self,
        label: impl Into<String>,
        kind: PredictionKind,
        reference: Reference,
        status: PredictionStatus,
    ) -> Reference {
        let prediction = Prediction {
            label: label.into(),
            kind,
            reference,
            status,
        };
        match self.entries.iter_mut().find(|p| p.label == prediction.label) {
            Some(existing) => *existing = prediction,
            None => self.entries.push(prediction),
        }
        reference
    }

    /// Record a predicted contract address
    ///
    /// # Returns
    /// The recorded address
    pub fn deployment(&mut self, label: impl Into<String>, address: Address, status: PredictionStatus) -> Address {
        self.record(label, PredictionKind::Deployment, Reference::Address(address), status);
        address
    }

    /// Record a predicted schema UID
    ///
    /// # Returns
    /// The recorded UID
    pub fn schema(&mut self, label: impl Into<String>, uid: H256, status: PredictionStatus) -> H256 {
        self.record(label, PredictionKind::Schema, Reference::Identifier(uid), status);
        uid
    }

    /// Record a pending attestation under `schema`
    ///
    /// # Returns
    /// The recorded UID
    pub fn attestation(&mut self, label: impl Into<String>, uid: H256, schema: H256) -> H256 {
        self.record(
            label,
            PredictionKind::Attestation { schema },
            Reference::Identifier(uid),
            PredictionStatus::Pending,
        );
        uid
    }

    /// Record the expected revocation of attestation `uid` under `schema`
    pub fn revocation(&mut self, label: impl Into<String>, uid: H256, schema: H256) {
        self.record(
            label,
            PredictionKind::Revocation { schema },
            Reference::Identifier(uid),
            PredictionStatus::Pending,
        );
    }

    /// Record that `core` is expected to emit `PolicyRegistered` for `policy`
    ///
    /// The prediction's reference is the core contract, the emitter of the event.
    pub fn policy_registration(&mut self, label: impl Into<String>, core: Address, policy: Address) {
        self.record(
            label,
            PredictionKind::PolicyRegistration { policy },
            Reference::Address(core),
            PredictionStatus::Pending,
        );
    }

    /// Prediction recorded under `label`
    pub fn get(&self, label: &str) -> Option<&Prediction> {
        self.entries.iter().find(|p| p.label == label)
    }

    /// Predicted address recorded under `label`
    pub fn address(&self, label: &str) -> Result<Address, OrchestrationError> {
        match self.get(label).map(|p| p.reference) {
            Some(Reference::Address(address)) => Ok(address),
            Some(Reference::Identifier(_)) => Err(OrchestrationError::MissingDependency(format!(
                "{} is an identifier, not an address",
                label
            ))),
            None => Err(OrchestrationError::MissingDependency(label.to_string())),
        }
    }

    /// Predicted identifier recorded under `label`
    pub fn identifier(&self, label: &str) -> Result<H256, OrchestrationError> {
        match self.get(label).map(|p| p.reference) {
            Some(Reference::Identifier(uid)) => Ok(uid),
            Some(Reference::Address(_)) => Err(OrchestrationError::MissingDependency(format!(
                "{} is an address, not an identifier",
                label
            ))),
            None => Err(OrchestrationError::MissingDependency(label.to_string())),
        }
    }

    /// All predictions, in the order they were first recorded
    pub fn iter(&self) -> impl Iterator<Item = &Prediction> {
        self.entries.iter()
    }

    /// Predictions the batch is expected to create, in prediction order
    pub fn pending(&self) -> impl Iterator<Item = &Prediction> {
        self.entries.iter().filter(|p| p.is_pending())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
