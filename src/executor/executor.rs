use crate::{
    Receipt, Reference, TxHandle,
    batch::CallBatch,
    config::{ExecutorConfig, NetworkConfig},
    error::OrchestrationError,
    ledger::{
        Ledger,
        events::{self, RegistryEvent},
    },
    predict::{Prediction, PredictionKind, Predictions},
};
use ethers::types::{Address, H256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

/// Values confirmed by a finalized batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub handle: TxHandle,
    pub block_number: u64,
    /// Confirmed values by label, in prediction order
    pub confirmed: Vec<(String, Reference)>,
}

impl Confirmation {
    /// Confirmed value recorded under `label`
    pub fn get(&self, label: &str) -> Option<Reference> {
        self.confirmed
            .iter()
            .find(|(confirmed, _)| confirmed == label)
            .map(|(_, reference)| *reference)
    }
}

/// Transaction executor
///
/// Submits batches on behalf of one wallet account, waits for their receipts
/// and checks the emitted events against what the workflow predicted.
/// Executors of the same wallet share a session lock so that only one
/// submission is in flight at a time.
#[derive(Clone)]
pub struct TransactionExecutor {
    ledger: Arc<dyn Ledger>,
    account: Address,
    network: NetworkConfig,
    config: ExecutorConfig,
    session: Arc<Mutex<()>>,
}

impl TransactionExecutor {
    /// Creates an executor with its own wallet session
    ///
    /// # Arguments
    /// * `ledger` - Backend the batches are submitted to
    /// * `account` - Wallet account that signs every batch
    /// * `network` - Registry addresses whose events confirm predictions
    /// * `config` - Receipt polling settings
    pub fn new(ledger: Arc<dyn Ledger>, account: Address, network: NetworkConfig, config: ExecutorConfig) -> Self {
        Self {
            ledger,
            account,
            network,
            config,
            session: Arc::new(Mutex::new(())),
        }
    }

    /// Share the wallet session of another executor
    pub fn with_session(mut self, session: Arc<Mutex<()>>) -> Self {
        self.session = session;
        self
    }

    /// Lock held for the duration of each submission
    pub fn session(&self) -> Arc<Mutex<()>> {
        self.session.clone()
    }

    /// Account that signs every batch
    pub fn account(&self) -> Address {
        self.account
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Submit `batch` as one atomic transaction
    ///
    /// The ordering invariant is checked first; a forward reference means a
    /// dependency would not exist yet when its consumer runs.
    pub async fn submit(&self, batch: &CallBatch) -> Result<TxHandle, OrchestrationError> {
        if let Err(violation) = batch.verify_ordering() {
            error!("Refusing to submit batch: {}", violation);
            return Err(OrchestrationError::MissingDependency(violation.to_string()));
        }

        let _session = self.session.lock().await;
        debug!("Submitting batch of {} calls from {:?}", batch.len(), self.account);
        let handle = self.ledger.submit(self.account, batch.calls()).await.map_err(|e| {
            warn!("Submission failed: {}", e);
            OrchestrationError::from(e)
        })?;
        info!("Batch submitted: {}", handle);
        Ok(handle)
    }

    /// Poll for the receipt of `handle` until it is final or the timeout elapses
    pub async fn await_receipt(&self, handle: &TxHandle) -> Result<Receipt, OrchestrationError> {
        let started = Instant::now();
        let timeout = self.config.receipt_timeout();

        loop {
            if let Some(receipt) = self.ledger.receipt(handle).await? {
                debug!(
                    "Receipt for {} after {}ms: {:?} in block {}",
                    handle,
                    started.elapsed().as_millis(),
                    receipt.status,
                    receipt.block_number
                );
                return Ok(receipt);
            }

            let waited = started.elapsed();
            if waited >= timeout {
                warn!("No receipt for {} after {}ms", handle, waited.as_millis());
                return Err(OrchestrationError::ReceiptTimeout {
                    handle: handle.clone(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            sleep(self.config.poll_interval().min(timeout - waited)).await;
        }
    }

    /// Check a receipt against the pending predictions
    ///
    /// Registry events are paired positionally, per kind, with the pending
    /// predictions of that kind. Deployments emit nothing and are confirmed by
    /// the code at the predicted address.
    pub async fn confirm(&self, receipt: &Receipt, predictions: &Predictions) -> Result<Confirmation, OrchestrationError> {
        if !receipt.succeeded() {
            warn!("Batch {} reverted", receipt.handle);
            return Err(OrchestrationError::ExecutionReverted {
                handle: receipt.handle.clone(),
            });
        }

        let emitted: Vec<RegistryEvent> = receipt.logs.iter().filter_map(events::decode).collect();
        let mut schemas = emitted.iter().filter_map(|event| match event {
            RegistryEvent::SchemaRegistered { registry, uid, .. } if *registry == self.network.schema_registry => {
                Some(*uid)
            }
            _ => None,
        });
        let mut attestations = emitted.iter().filter_map(|event| match event {
            RegistryEvent::Attested { service, uid, schema, .. } if *service == self.network.eas => Some((*uid, *schema)),
            _ => None,
        });
        let mut revocations = emitted.iter().filter_map(|event| match event {
            RegistryEvent::Revoked { service, uid, schema, .. } if *service == self.network.eas => Some((*uid, *schema)),
            _ => None,
        });
        let mut registrations = emitted.iter().filter_map(|event| match event {
            RegistryEvent::PolicyRegistered { core, policy } => Some((*core, *policy)),
            _ => None,
        });

        let mut confirmed = Vec::new();
        for prediction in predictions.pending() {
            let (observed, consistent) = match prediction.kind {
                PredictionKind::Deployment => (self.observe_code(prediction).await?, true),
                PredictionKind::Schema => (schemas.next().map(Reference::Identifier), true),
                PredictionKind::Attestation { schema } => observe_record(attestations.next(), schema),
                PredictionKind::Revocation { schema } => observe_record(revocations.next(), schema),
                PredictionKind::PolicyRegistration { policy } => match registrations.next() {
                    Some((core, registered)) => (Some(Reference::Address(core)), registered == policy),
                    None => (None, true),
                },
            };

            if !consistent || observed != Some(prediction.reference) {
                error!(
                    "Prediction mismatch for {}: predicted {}, observed {:?}",
                    prediction.label, prediction.reference, observed
                );
                return Err(OrchestrationError::PredictionMismatch {
                    label: prediction.label.clone(),
                    predicted: prediction.reference,
                    observed,
                });
            }
            confirmed.push((prediction.label.clone(), prediction.reference));
        }

        info!(
            "Batch {} confirmed {} predictions in block {}",
            receipt.handle,
            confirmed.len(),
            receipt.block_number
        );
        Ok(Confirmation {
            handle: receipt.handle.clone(),
            block_number: receipt.block_number,
            confirmed,
        })
    }

    /// Submit, wait for finality and confirm
    pub async fn execute(&self, batch: &CallBatch, predictions: &Predictions) -> Result<Confirmation, OrchestrationError> {
        let handle = self.submit(batch).await?;
        let receipt = self.await_receipt(&handle).await?;
        self.confirm(&receipt, predictions).await
    }

    async fn observe_code(&self, prediction: &Prediction) -> Result<Option<Reference>, OrchestrationError> {
        let Reference::Address(address) = prediction.reference else {
            return Ok(None);
        };
        let code = self.ledger.code_at(address).await?;
        Ok((!code.is_empty()).then_some(prediction.reference))
    }
}

/// Observed identifier of an attestation or revocation event, and whether it
/// was emitted under the expected schema
fn observe_record(event: Option<(H256, H256)>, schema: H256) -> (Option<Reference>, bool) {
    match event {
        Some((uid, emitted)) => (Some(Reference::Identifier(uid)), emitted == schema),
        None => (None, true),
    }
}
