use super::ContentStore;
use crate::{ContentRef, error::ContentError};
use async_trait::async_trait;
use ethers::types::H256;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory content store keyed by the sha-256 digest of the content
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<H256, Vec<u8>>>,
    fail_uploads: AtomicBool,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following upload fail until called with `false`
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Stored bytes for `digest`, if any
    pub async fn get(&self, digest: &H256) -> Option<Vec<u8>> {
        self.blobs.read().await.get(digest).cloned()
    }

    /// Number of distinct blobs stored
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put_bytes(&self, bytes: Vec<u8>) -> Result<ContentRef, ContentError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ContentError::Upload("content store unavailable".to_string()));
        }

        let digest = H256::from_slice(&Sha256::digest(&bytes));
        let cid = format!("sha256-{}", ethers::utils::hex::encode(digest.as_bytes()));
        self.blobs.write().await.insert(digest, bytes);
        Ok(ContentRef { cid, digest })
    }
}
