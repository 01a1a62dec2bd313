//! Blob storage for medicine images
//!
//! Image bytes are kept out of the registry; a drone's cargo only holds the
//! opaque reference returned by [`BlobStore::put`].

mod fs;
mod memory;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

use async_trait::async_trait;
use bytes::Bytes;
use dispatch_shared::limits;
use std::io;
use std::path::Path;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Opaque reference to a stored blob
pub type BlobRef = String;

/// Errors reported by blob stores
#[derive(Error, Debug)]
pub enum BlobStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Blob not found: {0}")]
    NotFound(BlobRef),

    #[error("Invalid blob reference: {0}")]
    InvalidRef(String),

    #[error("Blob store unavailable: {0}")]
    Unavailable(String),
}

impl BlobStoreError {
    /// Whether repeating the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            BlobStoreError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            BlobStoreError::Unavailable(_) => true,
            BlobStoreError::NotFound(_) | BlobStoreError::InvalidRef(_) => false,
        }
    }
}

/// Storage backend for uploaded images
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data`, returning a fresh reference. `filename` is only a hint
    /// (its extension is kept on the reference).
    async fn put(&self, filename: &str, data: Bytes) -> Result<BlobRef, BlobStoreError>;

    /// Read a blob back
    async fn get(&self, blob_ref: &str) -> Result<Bytes, BlobStoreError>;

    /// Remove a blob
    async fn delete(&self, blob_ref: &str) -> Result<(), BlobStoreError>;

    /// Human-readable name for this backend
    fn name(&self) -> &'static str;
}

/// Store a blob, retrying transient failures a bounded number of times
pub async fn put_with_retry(
    store: &dyn BlobStore,
    filename: &str,
    data: Bytes,
) -> Result<BlobRef, BlobStoreError> {
    let mut attempt = 1;

    loop {
        match store.put(filename, data.clone()).await {
            Ok(blob_ref) => return Ok(blob_ref),
            Err(e) if e.is_transient() && attempt < limits::BLOB_STORE_MAX_ATTEMPTS => {
                warn!(
                    "Storing {} in {} failed, retrying ({}/{}): {}",
                    filename,
                    store.name(),
                    attempt,
                    limits::BLOB_STORE_MAX_ATTEMPTS,
                    e
                );
                sleep(Duration::from_millis(
                    limits::BLOB_STORE_RETRY_DELAY_MS * u64::from(attempt),
                ))
                .await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Build a new reference that keeps the image extension of `filename`
fn new_blob_ref(filename: &str) -> BlobRef {
    let id = uuid::Uuid::new_v4().simple();
    match Path::new(filename).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!("{}.{}", id, ext.to_ascii_lowercase())
        }
        _ => id.to_string(),
    }
}

/// References are plain file names: no separators, no leading dot
fn check_blob_ref(blob_ref: &str) -> Result<(), BlobStoreError> {
    let well_formed = !blob_ref.is_empty()
        && !blob_ref.starts_with('.')
        && blob_ref
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');

    if well_formed {
        Ok(())
    } else {
        Err(BlobStoreError::InvalidRef(blob_ref.to_string()))
    }
}
