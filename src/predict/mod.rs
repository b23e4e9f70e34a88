//! Prediction Module
//!
//! Pure functions that compute, ahead of execution, the values the ledger will
//! assign once a batch lands:
//! - address: salts and CREATE2 deployment addresses
//! - identifier: schema and attestation UIDs of the attestation registry
//! - record: the per-workflow record of what was predicted
//!
//! Every function here must stay bit-exact with the ledger's own rule. A
//! divergence does not fail loudly; it yields a wrong value that only shows up
//! when the executor cross-checks the receipt.

pub mod address;
pub mod identifier;
mod record;

pub use address::{derive_salt, init_code, predict, predict_deployment};
pub use identifier::{AttestationFields, attestation_uid, schema_uid};
pub use record::{Prediction, PredictionKind, PredictionStatus, Predictions};
