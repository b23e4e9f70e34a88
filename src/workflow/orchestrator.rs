//! Workflow Orchestrator
//!
//! Drives a `Workflow` through build, submission and confirmation, keeping
//! the explicit state machine in step and publishing every change to
//! observers through a watch channel. Failures are classified so the caller
//! knows whether to resubmit, rebuild, re-query or give up.

use super::{WorkflowContext, WorkflowKind, WorkflowSnapshot, WorkflowState, WorkflowStatus};
use crate::{
    TxHandle,
    batch::CallBatch,
    error::{OrchestrationError, Recovery},
    executor::{Confirmation, TransactionExecutor},
    predict::Predictions,
};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// A domain flow that composes one atomic batch
///
/// `build` records every value it predicts in `predictions`, in the order the
/// providing calls are appended. Everything the batch depends on must be
/// computed or fetched before the dependent call is appended.
#[async_trait]
pub trait Workflow: Send + Sync {
    fn kind(&self) -> WorkflowKind;

    async fn build(&self, ctx: &WorkflowContext, predictions: &mut Predictions) -> Result<CallBatch, OrchestrationError>;
}

/// Workflow orchestrator
///
/// Drives one workflow at a time through the state machine and publishes
/// every transition to its subscribers. The orchestrator owns the state, the
/// predictions and the batch; observers only ever see snapshots.
pub struct WorkflowOrchestrator {
    context: WorkflowContext,
    executor: TransactionExecutor,
    state: WorkflowState,
    /// Last batch built, kept for resubmission after a rejection
    batch: Option<CallBatch>,
    notifier: watch::Sender<WorkflowSnapshot>,
}

impl WorkflowOrchestrator {
    /// Creates an idle orchestrator
    ///
    /// # Arguments
    /// * `context` - Collaborators the workflows build against
    /// * `executor` - Executor that submits and confirms the batches
    pub fn new(context: WorkflowContext, executor: TransactionExecutor) -> Self {
        let state = WorkflowState::default();
        let (notifier, _) = watch::channel(state.snapshot());
        Self {
            context,
            executor,
            state,
            batch: None,
            notifier,
        }
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Predictions of the current or last workflow
    pub fn predictions(&self) -> &Predictions {
        &self.state.predictions
    }

    /// Receive a snapshot after every transition
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.notifier.subscribe()
    }

    /// Build, submit and confirm `workflow`
    ///
    /// Must start from `Idle`. On success the state is `Completed` and holds
    /// the confirmed values; on failure it is `Failed` with the classified
    /// error, except for a receipt timeout, which stays `Submitted`.
    pub async fn run(&mut self, workflow: &dyn Workflow) -> Result<Confirmation, OrchestrationError> {
        if self.state.status != WorkflowStatus::Idle {
            return Err(OrchestrationError::InvalidTransition {
                from: self.state.status.to_string(),
                to: WorkflowStatus::Building.name(),
            });
        }

        info!("Starting {} workflow", workflow.kind());
        self.state = WorkflowState::begin(workflow.kind());
        self.transition(WorkflowStatus::Building, "composing batch")?;

        let mut predictions = Predictions::new();
        let built = workflow.build(&self.context, &mut predictions).await;
        self.state.predictions = predictions;
        let batch = match built {
            Ok(batch) => batch,
            Err(err) => return Err(self.fail(err)),
        };

        for (index, call) in batch.calls().iter().enumerate() {
            debug!("  #{} {} -> {:?}", index, call.label, call.target);
        }
        self.batch = Some(batch.clone());
        self.submit(&batch).await
    }

    /// Wait again for the receipt of a submission that timed out
    pub async fn requery(&mut self) -> Result<Confirmation, OrchestrationError> {
        let handle = match (&self.state.status, &self.state.handle) {
            (WorkflowStatus::Submitted, Some(handle)) => handle.clone(),
            _ => {
                return Err(OrchestrationError::InvalidTransition {
                    from: self.state.status.to_string(),
                    to: WorkflowStatus::Completed.name(),
                });
            }
        };
        info!("Re-querying receipt for {}", handle);
        self.set_step("awaiting receipt");
        self.finish(&handle).await
    }

    /// Recover from the last failure the way its classification allows
    ///
    /// A rejected batch is offered again unchanged, a reverted one is rebuilt
    /// from the same inputs, a timed-out one is re-queried. Anything else
    /// cannot be retried.
    pub async fn retry(&mut self, workflow: &dyn Workflow) -> Result<Confirmation, OrchestrationError> {
        let recovery = self.state.error.as_ref().map(|err| err.recovery());
        match (self.state.status, recovery) {
            (WorkflowStatus::Submitted, Some(Recovery::Requery)) => self.requery().await,
            (WorkflowStatus::Failed, Some(Recovery::Resubmit)) => {
                let (Some(batch), Some(kind)) = (self.batch.take(), self.state.kind) else {
                    return Err(OrchestrationError::MissingDependency("batch to resubmit".to_string()));
                };
                warn!("Resubmitting unchanged {} batch", kind);
                let predictions = std::mem::take(&mut self.state.predictions);
                self.state = WorkflowState::begin(kind);
                self.state.predictions = predictions;
                self.transition(WorkflowStatus::Building, "resubmitting batch")?;
                self.batch = Some(batch.clone());
                self.submit(&batch).await
            }
            (WorkflowStatus::Failed, Some(Recovery::Rebuild)) => {
                warn!("Rebuilding {} batch after revert", workflow.kind());
                self.reset()?;
                self.run(workflow).await
            }
            (status, _) => Err(OrchestrationError::InvalidTransition {
                from: status.to_string(),
                to: WorkflowStatus::Building.name(),
            }),
        }
    }

    /// Return to `Idle`, dropping state, predictions and batch
    ///
    /// A submitted batch cannot be abandoned; it can only be waited for.
    pub fn reset(&mut self) -> Result<(), OrchestrationError> {
        if self.state.status == WorkflowStatus::Submitted {
            return Err(OrchestrationError::InvalidTransition {
                from: self.state.status.to_string(),
                to: WorkflowStatus::Idle.name(),
            });
        }
        debug!("Resetting workflow from {}", self.state.status);
        self.state = WorkflowState::default();
        self.batch = None;
        self.publish();
        Ok(())
    }

    async fn submit(&mut self, batch: &CallBatch) -> Result<Confirmation, OrchestrationError> {
        let submitted = self.executor.submit(batch).await;
        let handle = match submitted {
            Ok(handle) => handle,
            Err(err) => return Err(self.fail(err)),
        };
        self.state.handle = Some(handle.clone());
        self.transition(WorkflowStatus::Submitted, "awaiting receipt")?;
        self.finish(&handle).await
    }

    async fn finish(&mut self, handle: &TxHandle) -> Result<Confirmation, OrchestrationError> {
        let awaited = self.executor.await_receipt(handle).await;
        let receipt = match awaited {
            Ok(receipt) => receipt,
            Err(err @ OrchestrationError::ReceiptTimeout { .. }) => {
                warn!("{}; workflow stays submitted", err);
                self.state.error = Some(err.clone());
                self.set_step("receipt timed out");
                return Err(err);
            }
            Err(err) => return Err(self.fail(err)),
        };

        self.set_step("confirming predictions");
        let confirmed = self.executor.confirm(&receipt, &self.state.predictions).await;
        match confirmed {
            Ok(confirmation) => {
                self.state.error = None;
                self.state.confirmation = Some(confirmation.clone());
                self.transition(WorkflowStatus::Completed, "done")?;
                Ok(confirmation)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn transition(&mut self, next: WorkflowStatus, step: &str) -> Result<(), OrchestrationError> {
        let from = self.state.status;
        self.state.transition(next, step)?;
        info!("Workflow {} -> {} ({})", from, next, step);
        self.publish();
        Ok(())
    }

    fn set_step(&mut self, step: &str) {
        self.state.step = step.to_string();
        self.publish();
    }

    /// Move to `Failed` with `err` attached and hand the error back
    fn fail(&mut self, err: OrchestrationError) -> OrchestrationError {
        if err.is_fatal() {
            error!("Workflow failed: {}", err);
        } else {
            warn!("Workflow failed: {} (recovery: {:?})", err, err.recovery());
        }
        self.state.error = Some(err.clone());
        if let Err(invalid) = self.state.transition(WorkflowStatus::Failed, "failed") {
            warn!("{}", invalid);
        }
        self.publish();
        err
    }

    fn publish(&self) {
        self.notifier.send_replace(self.state.snapshot());
    }
}
