//! In-memory blob store, used when no blob directory is configured

use super::{check_blob_ref, new_blob_ref, BlobRef, BlobStore, BlobStoreError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Keeps blobs in a map for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobRef, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored blobs
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, filename: &str, data: Bytes) -> Result<BlobRef, BlobStoreError> {
        let blob_ref = new_blob_ref(filename);
        self.blobs.write().await.insert(blob_ref.clone(), data);
        Ok(blob_ref)
    }

    async fn get(&self, blob_ref: &str) -> Result<Bytes, BlobStoreError> {
        check_blob_ref(blob_ref)?;
        self.blobs
            .read()
            .await
            .get(blob_ref)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(blob_ref.to_string()))
    }

    async fn delete(&self, blob_ref: &str) -> Result<(), BlobStoreError> {
        check_blob_ref(blob_ref)?;
        self.blobs
            .write()
            .await
            .remove(blob_ref)
            .map(|_| ())
            .ok_or_else(|| BlobStoreError::NotFound(blob_ref.to_string()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
