//! Content Store Module
//!
//! This module abstracts the content-addressed blob store that holds
//! descriptive data (images, metadata documents) referenced on-chain by a
//! fixed-width digest.

mod memory;

pub use memory::MemoryContentStore;

use crate::{ContentRef, error::ContentError};
use async_trait::async_trait;

/// Content-addressed blob store
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store raw bytes and return their identifier and digest
    async fn put_bytes(&self, bytes: Vec<u8>) -> Result<ContentRef, ContentError>;

    /// Store a structured document
    async fn put_json(&self, document: &serde_json::Value) -> Result<ContentRef, ContentError> {
        let bytes = serde_json::to_vec(document).map_err(|e| ContentError::Serialize(e.to_string()))?;
        self.put_bytes(bytes).await
    }
}
