//! Call Batching Module
//!
//! This module handles batch construction:
//! - CallBatchBuilder: accumulates calls in strict insertion order
//! - CallBatch: the sealed batch, with an explicit ordering check

mod builder;


pub use builder::{CallBatch, CallBatchBuilder, OrderingViolation, ViolationKind};
