//! Configuration Module
//!
//! This module defines all configuration structures for the orchestrator.
//! Configuration is loaded from TOML files and parsed using serde.

use crate::{
    artifact::{Artifact, ArtifactTable},
    encode::abi,
    error::EncodingError,
};
use ethers::types::{Address, Bytes};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

/// Main configuration structure
///
/// Contains all configuration sections for the orchestrator.
/// Loaded from a TOML file (e.g., config/default.toml).
///
/// # Example TOML
/// ```toml
/// [network]
/// chain_id = 84532
/// factory = "0x4e59b44847b379578588920ca78fbf26c0b4956c"
/// schema_registry = "0x4200000000000000000000000000000000000020"
/// eas = "0x4200000000000000000000000000000000000021"
/// block_time_secs = 2
///
/// [executor]
/// receipt_timeout_ms = 60000
/// poll_interval_ms = 1000
///
/// [artifacts.storePolicy]
/// bytecode = "0x6080604052"
/// constructor = ["address", "address"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    pub rpc: Option<RpcConfig>,
    #[serde(default)]
    pub schemas: SchemaConfig,
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactConfig>,
}

/// Addresses of the ledger collaborators on one network
///
/// # Fields
/// - `chain_id`: Chain the batches are submitted to
/// - `factory`: Deterministic deployment factory (CREATE2 proxy)
/// - `schema_registry`: Schema registry of the attestation service
/// - `eas`: Attestation service contract
/// - `block_time_secs`: Expected block interval, used for timestamp hints
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub factory: Address,
    pub schema_registry: Address,
    pub eas: Address,
    #[serde(default = "default_block_time")]
    pub block_time_secs: u64,
}

fn default_block_time() -> u64 {
    2
}

/// Receipt polling configuration
///
/// # Fields
/// - `receipt_timeout_ms`: How long to wait for finality before reporting a timeout
/// - `poll_interval_ms`: Delay between two receipt queries
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutorConfig {
    pub receipt_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            receipt_timeout_ms: 60_000,
            poll_interval_ms: 1_000,
        }
    }
}

impl ExecutorConfig {
    /// How long to wait for a receipt before giving up
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    /// Delay between receipt queries, never zero
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Wallet JSON-RPC endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub url: String,
}

/// Schema texts registered for every store
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub store: String,
    pub policy: String,
    pub product: String,
    pub order: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            store: "string name,bytes32 metadataHash,address store".to_string(),
            policy: "address policy,string kind".to_string(),
            product: "string sku,uint256 price,bytes32 metadataHash".to_string(),
            order: "bytes32 product,uint256 quantity,uint256 amount".to_string(),
        }
    }
}

/// A deployable unit as written in the configuration file
///
/// # Fields
/// - `bytecode`: Hex-encoded creation code
/// - `constructor`: Solidity type names of the constructor arguments
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    pub bytecode: Bytes,
    #[serde(default)]
    pub constructor: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was successfully loaded and parsed
    /// * `Err` if the file couldn't be read or the TOML is invalid
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Build the typed artifact table, resolving constructor type names
    pub fn artifacts(&self) -> Result<ArtifactTable, EncodingError> {
        let mut table = ArtifactTable::new();
        for (name, artifact) in &self.artifacts {
            let constructor = artifact
                .constructor
                .iter()
                .map(|ty| abi::parse_param_type(ty))
                .collect::<Result<Vec<_>, _>>()?;
            table.insert(Artifact::new(name.clone(), artifact.bytecode.clone(), constructor));
        }
        Ok(table)
    }
}
