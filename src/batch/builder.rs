//! Batch Builder Module
//!
//! This module accumulates calls into an ordered batch. The ledger executes a
//! batch strictly top to bottom, so the builder never reorders anything.
//!
//! The ordering invariant itself is checked on the sealed `CallBatch`, not
//! while appending: workflows append calls only after computing every value
//! they reference, and verify the finished batch before submitting it.

use crate::{Call, Reference};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Accumulates calls in insertion order
#[derive(Debug, Default)]
pub struct CallBatchBuilder {
    calls: Vec<Call>,
}

impl CallBatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call to the end of the batch
    pub fn append(&mut self, call: Call) -> &mut Self {
        self.calls.push(call);
        self
    }

    /// Calls appended so far, in execution order
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Seal the builder into a batch
    pub fn build(self) -> CallBatch {
        CallBatch { calls: self.calls }
    }
}

/// How a call breaks the batch ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// The call references a value provided by the same or a later call
    ForwardReference,
    /// The call provides a value an earlier call already provides
    DuplicateProvider,
}

/// A call whose position in the batch cannot execute as predicted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingViolation {
    pub kind: ViolationKind,
    /// Index of the offending call
    pub index: usize,
    pub label: String,
    pub reference: Reference,
    /// Index of the first call that provides `reference`
    pub provided_at: usize,
}

impl fmt::Display for OrderingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::ForwardReference => write!(
                f,
                "call #{} ({}) references {} which is only provided by call #{}",
                self.index, self.label, self.reference, self.provided_at
            ),
            ViolationKind::DuplicateProvider => write!(
                f,
                "call #{} ({}) provides {} which call #{} already provides",
                self.index, self.label, self.reference, self.provided_at
            ),
        }
    }
}

/// Ordered sequence of calls executed as one atomic transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallBatch {
    calls: Vec<Call>,
}

impl CallBatch {
    /// Calls in execution order
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Sum of the native value forwarded by all calls
    pub fn total_value(&self) -> U256 {
        self.calls.iter().fold(U256::zero(), |acc, call| acc.saturating_add(call.value))
    }

    /// Index of the first call that provides `reference`
    pub fn provider_of(&self, reference: &Reference) -> Option<usize> {
        self.calls.iter().position(|call| call.creates(reference))
    }

    /// Every call that cannot execute as predicted where it stands
    ///
    /// Reports each reference to a value provided by the same or a later
    /// call, and each call providing a value an earlier call already provides
    /// (the second deployment at one address always reverts). References to
    /// values no call provides are treated as already existing on the ledger
    /// and are not reported.
    ///
    /// # Returns
    /// Violations ordered by the index of the offending call
    pub fn forward_references(&self) -> Vec<OrderingViolation> {
        let mut first_provider: HashMap<Reference, usize> = HashMap::new();
        let mut violations = Vec::new();
        for (index, call) in self.calls.iter().enumerate() {
            for reference in &call.provides {
                match first_provider.get(reference) {
                    Some(&provided_at) => violations.push(OrderingViolation {
                        kind: ViolationKind::DuplicateProvider,
                        index,
                        label: call.label.clone(),
                        reference: *reference,
                        provided_at,
                    }),
                    None => {
                        first_provider.insert(*reference, index);
                    }
                }
            }
        }

        for (index, call) in self.calls.iter().enumerate() {
            for reference in &call.references {
                if let Some(&provided_at) = first_provider.get(reference) {
                    if provided_at >= index {
                        violations.push(OrderingViolation {
                            kind: ViolationKind::ForwardReference,
                            index,
                            label: call.label.clone(),
                            reference: *reference,
                            provided_at,
                        });
                    }
                }
            }
        }
        violations.sort_by_key(|violation| violation.index);
        violations
    }

    /// Check that every in-batch dependency is provided strictly earlier and
    /// that no value is provided twice
    ///
    /// # Returns
    /// * `Ok(())` if the batch is well ordered
    /// * `Err` with the violation at the lowest call index otherwise
    pub fn verify_ordering(&self) -> Result<(), OrderingViolation> {
        match self.forward_references().into_iter().next() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }
}

impl From<Vec<Call>> for CallBatch {
    fn from(calls: Vec<Call>) -> Self {
        Self { calls }
    }
}
