//! Error Types
//!
//! Every failure the orchestration engine can report, grouped by the layer
//! that raises it. `OrchestrationError` is what workflows surface; the other
//! enums convert into it.

use crate::{Reference, TxHandle};
use thiserror::Error;

/// Malformed inputs to a predictor or encoder. Always a caller bug.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("unknown deployable unit: {0}")]
    UnknownUnit(String),

    /// The same unit would be deployed twice at one address
    #[error("deployable unit listed more than once: {0}")]
    DuplicateUnit(String),

    #[error("{context}: expected {expected} arguments, got {got}")]
    ArityMismatch {
        context: String,
        expected: usize,
        got: usize,
    },

    #[error("{context}: argument {index} is not a valid {expected}")]
    TypeMismatch {
        context: String,
        index: usize,
        expected: String,
    },

    #[error("unsupported parameter type: {0}")]
    UnsupportedType(String),

    #[error("invalid function signature: {0}")]
    InvalidSignature(String),
}

/// Failures reported by a ledger backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The wallet holder declined to authorize the submission
    #[error("submission rejected by user: {0}")]
    Rejected(String),

    #[error("unknown transaction handle: {0}")]
    UnknownHandle(String),

    #[error("ledger transport error: {0}")]
    Transport(String),
}

/// Failures reported by the content store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("could not serialize content: {0}")]
    Serialize(String),
}

/// What a caller may do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Offer the unchanged batch again
    Resubmit,
    /// Rebuild the batch from the same inputs and submit it
    Rebuild,
    /// Re-query the existing handle; never resubmit
    Requery,
    /// Not retryable; surface to an operator
    Abort,
}

/// Classified failure of a workflow
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("prediction mismatch for {label}: predicted {predicted}, observed {observed:?}")]
    PredictionMismatch {
        label: String,
        predicted: Reference,
        observed: Option<Reference>,
    },

    #[error("user rejected the batch")]
    UserRejected,

    #[error("batch {handle} reverted")]
    ExecutionReverted { handle: TxHandle },

    #[error("no receipt for {handle} after {waited_ms}ms")]
    ReceiptTimeout { handle: TxHandle, waited_ms: u64 },

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("content store error: {0}")]
    ContentStore(#[from] ContentError),

    #[error("{0}")]
    Ledger(LedgerError),

    #[error("invalid workflow transition from {from} to {to}")]
    InvalidTransition { from: String, to: &'static str },
}

impl From<LedgerError> for OrchestrationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected(_) => OrchestrationError::UserRejected,
            other => OrchestrationError::Ledger(other),
        }
    }
}

impl OrchestrationError {
    /// How a caller may recover from this error
    ///
    /// # Returns
    /// * `Resubmit` for a rejected batch
    /// * `Rebuild` for a reverted batch
    /// * `Requery` for a receipt timeout
    /// * `Abort` for everything else
    pub fn recovery(&self) -> Recovery {
        match self {
            OrchestrationError::UserRejected => Recovery::Resubmit,
            OrchestrationError::ExecutionReverted { .. } => Recovery::Rebuild,
            OrchestrationError::ReceiptTimeout { .. } => Recovery::Requery,
            _ => Recovery::Abort,
        }
    }

    /// Fatal errors indicate a bug in the engine rather than a transient condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestrationError::PredictionMismatch { .. }
                | OrchestrationError::MissingDependency(_)
                | OrchestrationError::Encoding(_)
                | OrchestrationError::InvalidTransition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_maps_to_user_rejected() {
        let err: OrchestrationError = LedgerError::Rejected("denied".into()).into();
        assert_eq!(err, OrchestrationError::UserRejected);
        assert_eq!(err.recovery(), Recovery::Resubmit);
    }

    #[test]
    fn test_recovery_classification() {
        let handle = TxHandle("0x01".into());
        assert_eq!(
            OrchestrationError::ExecutionReverted { handle: handle.clone() }.recovery(),
            Recovery::Rebuild
        );
        assert_eq!(
            OrchestrationError::ReceiptTimeout { handle, waited_ms: 10 }.recovery(),
            Recovery::Requery
        );
        let mismatch = OrchestrationError::MissingDependency("store".into());
        assert_eq!(mismatch.recovery(), Recovery::Abort);
        assert!(mismatch.is_fatal());
        assert!(!OrchestrationError::UserRejected.is_fatal());
    }
}
