//! Deployable Units
//!
//! An artifact is the fixed creation bytecode of a contract plus the declared
//! types of its constructor arguments. Artifacts are supplied by configuration
//! and looked up by name when a workflow deploys a unit.

use crate::error::EncodingError;
use ethers::abi::ParamType;
use ethers::types::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// Creation code and constructor schema of a deployable contract
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub bytecode: Bytes,
    pub constructor: Vec<ParamType>,
}

impl Artifact {
    /// Creates an artifact
    ///
    /// # Arguments
    /// * `name` - Unit name, also the key in the artifact table
    /// * `bytecode` - Creation bytecode without constructor arguments
    /// * `constructor` - Constructor parameter types, in declaration order
    pub fn new(name: impl Into<String>, bytecode: impl Into<Bytes>, constructor: Vec<ParamType>) -> Self {
        Self {
            name: name.into(),
            bytecode: bytecode.into(),
            constructor,
        }
    }
}

/// Named lookup of artifacts for one network
#[derive(Debug, Clone, Default)]
pub struct ArtifactTable {
    artifacts: HashMap<String, Arc<Artifact>>,
}

impl ArtifactTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `artifact`, replacing any artifact of the same name
    pub fn insert(&mut self, artifact: Artifact) {
        self.artifacts.insert(artifact.name.clone(), Arc::new(artifact));
    }

    pub fn with(mut self, artifact: Artifact) -> Self {
        self.insert(artifact);
        self
    }

    /// Looks up an artifact by unit name
    ///
    /// # Errors
    /// `EncodingError::UnknownUnit` if no artifact is registered under `name`
    pub fn get(&self, name: &str) -> Result<Arc<Artifact>, EncodingError> {
        self.artifacts
            .get(name)
            .cloned()
            .ok_or_else(|| EncodingError::UnknownUnit(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
