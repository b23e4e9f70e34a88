//! Call Encoding Module
//!
//! This module converts logical operations into ledger calls:
//! - Operation: the closed set of operation kinds (deploy, registerSchema,
//!   registerPolicy, attest, revoke, invoke)
//! - CallEncoder: the encoding seam, with `AbiEncoder` as the standard backend
//! - abi: signatures, selectors and argument checks

pub mod abi;
mod encoder;
mod operation;

pub use encoder::{AbiEncoder, CallEncoder, encode};
pub use operation::{AttestationRequest, Operation, OperationKind};
