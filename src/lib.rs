//! This crate predicts the addresses and identifiers a storefront batch will create,
//! composes dependency-ordered atomic batches that reference those values, and drives
//! them through submission and confirmation against an attestation registry.

pub mod types; // Salts, references, calls, receipts and content references.
pub mod error; // Error taxonomy and recovery classification.
pub mod artifact; // Deployable units and their constructor schemas.
pub mod config; // Defines and loads system configuration.
pub mod predict; // Deterministic address and identifier prediction.
pub mod encode; // Encodes logical operations into ledger calls.
pub mod batch; // Ordered call batches and their ordering invariant.
pub mod ledger; // Ledger boundary: in-memory and JSON-RPC backends.
pub mod content; // Content-addressed blob store boundary.
pub mod executor; // Submits batches and confirms predictions.
pub mod workflow; // Workflow state machine and storefront flows.

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use config::Config;
pub use error::{OrchestrationError, Recovery};
pub use workflow::WorkflowOrchestrator;
