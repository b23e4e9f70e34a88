//! Workflow Context
//!
//! The collaborators a workflow builds against: the actor, network settings,
//! the artifact table, the call encoder, and the ledger and content store
//! backends. Also hosts the concurrent existence checks used to skip units
//! that an earlier batch already created.

use crate::{
    artifact::ArtifactTable,
    config::{Config, ExecutorConfig, NetworkConfig, SchemaConfig},
    content::ContentStore,
    encode::{AbiEncoder, CallEncoder},
    error::{EncodingError, OrchestrationError},
    executor::TransactionExecutor,
    ledger::Ledger,
    predict::PredictionStatus,
};
use ethers::types::{Address, H256};
use futures::future::try_join_all;
use std::sync::Arc;

/// Collaborators and settings shared by every workflow of one actor
#[derive(Clone)]
pub struct WorkflowContext {
    /// Account that signs the batches and owns what they create
    pub actor: Address,
    pub network: NetworkConfig,
    pub schemas: SchemaConfig,
    pub artifacts: Arc<ArtifactTable>,
    /// Encodes every operation a workflow appends
    pub encoder: Arc<dyn CallEncoder>,
    pub ledger: Arc<dyn Ledger>,
    pub content: Arc<dyn ContentStore>,
}

impl WorkflowContext {
    /// Creates a context for `actor` from the loaded configuration
    ///
    /// Operations are encoded with `AbiEncoder`; use `with_encoder` to swap it.
    ///
    /// # Arguments
    /// * `config` - Network, schema and artifact settings
    /// * `actor` - Account that signs and owns everything the workflows create
    /// * `ledger` - Ledger backend to read from and submit to
    /// * `content` - Off-chain store for images and metadata
    ///
    /// # Errors
    /// `EncodingError` if an artifact in the configuration is malformed
    pub fn from_config(
        config: &Config,
        actor: Address,
        ledger: Arc<dyn Ledger>,
        content: Arc<dyn ContentStore>,
    ) -> Result<Self, EncodingError> {
        Ok(Self {
            actor,
            network: config.network.clone(),
            schemas: config.schemas.clone(),
            artifacts: Arc::new(config.artifacts()?),
            encoder: Arc::new(AbiEncoder),
            ledger,
            content,
        })
    }

    /// Replaces the call encoder
    pub fn with_encoder(mut self, encoder: Arc<dyn CallEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Executor signing as this context's actor
    pub fn executor(&self, config: ExecutorConfig) -> TransactionExecutor {
        TransactionExecutor::new(self.ledger.clone(), self.actor, self.network.clone(), config)
    }

    /// Timestamp the next batch is expected to execute at
    pub async fn timestamp(&self) -> Result<u64, OrchestrationError> {
        Ok(self.ledger.next_timestamp().await?)
    }

    /// Whether code already exists at each address
    ///
    /// All lookups run concurrently.
    ///
    /// # Returns
    /// One status per address, in input order: `Existing` where code is
    /// present, `Pending` otherwise
    pub async fn deployed(&self, addresses: &[Address]) -> Result<Vec<PredictionStatus>, OrchestrationError> {
        let checks = addresses.iter().map(|address| async move {
            let code = self.ledger.code_at(*address).await?;
            Ok::<_, OrchestrationError>(status_of(!code.is_empty()))
        });
        try_join_all(checks).await
    }

    /// Whether each schema is already registered
    pub async fn registered(&self, uids: &[H256]) -> Result<Vec<PredictionStatus>, OrchestrationError> {
        let checks = uids.iter().map(|uid| async move {
            let exists = self.ledger.schema_exists(*uid).await?;
            Ok::<_, OrchestrationError>(status_of(exists))
        });
        try_join_all(checks).await
    }
}

fn status_of(exists: bool) -> PredictionStatus {
    if exists {
        PredictionStatus::Existing
    } else {
        PredictionStatus::Pending
    }
}
