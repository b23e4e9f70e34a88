//! Workflow State Machine
//!
//! `Idle → Building → Submitted → Completed`, with `Failed` reachable from
//! every non-terminal state. `Completed` and `Failed` are terminal until the
//! workflow is reset.

use crate::{
    TxHandle,
    error::OrchestrationError,
    executor::Confirmation,
    predict::Predictions,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The domain flows the orchestrator can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowKind {
    CreateStore,
    CreateProduct,
    Purchase,
    DelistProduct,
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowKind::CreateStore => "create-store",
            WorkflowKind::CreateProduct => "create-product",
            WorkflowKind::Purchase => "purchase",
            WorkflowKind::DelistProduct => "delist-product",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    #[default]
    Idle,
    Building,
    Submitted,
    Completed,
    Failed,
}

impl WorkflowStatus {
    /// Lowercase name used in logs and transition errors
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowStatus::Idle => "idle",
            WorkflowStatus::Building => "building",
            WorkflowStatus::Submitted => "submitted",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }

    /// `Completed` and `Failed` only move on through `reset`
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, next),
            (Idle, Building) | (Building, Submitted) | (Submitted, Completed) | (Idle | Building | Submitted, Failed)
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything the orchestrator knows about the workflow it is running
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub kind: Option<WorkflowKind>,
    pub status: WorkflowStatus,
    /// Short description of the current step
    pub step: String,
    pub predictions: Predictions,
    pub confirmation: Option<Confirmation>,
    /// Last classified error; set on `Failed` and on receipt timeouts
    pub error: Option<OrchestrationError>,
    pub handle: Option<TxHandle>,
    pub started_at: u64,
    pub updated_at: u64,
}

impl WorkflowState {
    /// Fresh state for a workflow of `kind`
    pub fn begin(kind: WorkflowKind) -> Self {
        let now = now();
        Self {
            kind: Some(kind),
            started_at: now,
            updated_at: now,
            ..Default::default()
        }
    }

    /// Move to `next`, or report why the move is not allowed
    pub fn transition(&mut self, next: WorkflowStatus, step: impl Into<String>) -> Result<(), OrchestrationError> {
        if !self.status.can_transition_to(next) {
            return Err(OrchestrationError::InvalidTransition {
                from: self.status.to_string(),
                to: next.name(),
            });
        }
        self.status = next;
        self.step = step.into();
        self.updated_at = now();
        Ok(())
    }

    /// What observers are sent after each change
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            kind: self.kind,
            status: self.status,
            step: self.step.clone(),
            error: self.error.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// What observers see of a workflow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowSnapshot {
    pub kind: Option<WorkflowKind>,
    pub status: WorkflowStatus,
    pub step: String,
    pub error: Option<OrchestrationError>,
    pub updated_at: u64,
}

fn now() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = WorkflowState::begin(WorkflowKind::CreateStore);
        state.transition(WorkflowStatus::Building, "composing").unwrap();
        state.transition(WorkflowStatus::Submitted, "waiting").unwrap();
        state.transition(WorkflowStatus::Completed, "done").unwrap();
        assert!(state.status.is_terminal());
    }

    #[test]
    fn test_failure_reachable_from_live_states() {
        for status in [WorkflowStatus::Idle, WorkflowStatus::Building, WorkflowStatus::Submitted] {
            assert!(status.can_transition_to(WorkflowStatus::Failed));
        }
        assert!(!WorkflowStatus::Completed.can_transition_to(WorkflowStatus::Failed));
        assert!(!WorkflowStatus::Failed.can_transition_to(WorkflowStatus::Failed));
    }

    #[test]
    fn test_skipping_a_state_is_rejected() {
        let mut state = WorkflowState::begin(WorkflowKind::Purchase);
        let err = state.transition(WorkflowStatus::Submitted, "waiting").unwrap_err();

        assert_eq!(
            err,
            OrchestrationError::InvalidTransition {
                from: "idle".to_string(),
                to: "submitted",
            }
        );
        assert_eq!(state.status, WorkflowStatus::Idle);
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        let mut state = WorkflowState::begin(WorkflowKind::DelistProduct);
        state.transition(WorkflowStatus::Failed, "failed").unwrap();
        assert!(state.transition(WorkflowStatus::Building, "again").is_err());
        assert!(state.transition(WorkflowStatus::Completed, "done").is_err());
    }

    #[test]
    fn test_snapshot_mirrors_state() {
        let mut state = WorkflowState::begin(WorkflowKind::CreateProduct);
        state.transition(WorkflowStatus::Building, "uploading").unwrap();
        let snapshot = state.snapshot();

        assert_eq!(snapshot.kind, Some(WorkflowKind::CreateProduct));
        assert_eq!(snapshot.status, WorkflowStatus::Building);
        assert_eq!(snapshot.step, "uploading");
    }
}
