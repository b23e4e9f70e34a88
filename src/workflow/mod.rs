//! Workflow Module
//!
//! This module turns domain intents into atomic batches and drives them to
//! completion:
//! - state: the explicit workflow state machine and its observable snapshot
//! - orchestrator: runs one workflow through build, submit and confirm
//! - store / product / purchase / delist: the storefront flows
//!
//! # Architecture Flow
//! 1. Predict every address and identifier the batch will create
//! 2. Run uploads and ledger reads concurrently, join them
//! 3. Append calls in dependency order, recording each prediction
//! 4. Verify ordering, submit, await the receipt
//! 5. Cross-check the receipt and complete, or fail with a classified error

mod context;
mod delist;
mod orchestrator;
mod product;
mod purchase;
mod state;
mod store;


pub use context::WorkflowContext;
pub use delist::{DELIST_PRODUCT, DelistProduct};
pub use orchestrator::{Workflow, WorkflowOrchestrator};
pub use product::{CreateProduct, LIST_PRODUCT, PRODUCT_ATTESTATION, listed_product};
pub use purchase::{ORDER_ATTESTATION, PLACE_ORDER, Purchase};
pub use state::{WorkflowKind, WorkflowSnapshot, WorkflowState, WorkflowStatus};
pub use store::{
    CreateStore, ORDER_CONTRACT, ORDER_SCHEMA, POLICY_SCHEMA, PRODUCT_SCHEMA, PolicySpec, STORE_ATTESTATION,
    STORE_POLICY, STORE_SCHEMA, Storefront,
};
