//! Transaction Execution Module
//!
//! This module hands finished batches to the ledger:
//! - submission, serialized per wallet session
//! - receipt polling with a finality timeout
//! - confirmation of every pending prediction against the receipt

mod executor;

#[cfg(test)]
mod tests;

pub use executor::{Confirmation, TransactionExecutor};
