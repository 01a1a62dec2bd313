//! Filesystem blob store
//!
//! Each blob is one file directly under the store's root directory, named by
//! its reference. Writes go to a temporary name first and are renamed into
//! place, so a reader never sees a partially written image. The write runs
//! in its own task: if the caller stops waiting, the task still finishes and
//! removes what it wrote.

use super::{check_blob_ref, new_blob_ref, BlobRef, BlobStore, BlobStoreError};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BlobStoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, blob_ref: &str) -> Result<PathBuf, BlobStoreError> {
        check_blob_ref(blob_ref)?;
        Ok(self.root.join(blob_ref))
    }
}

/// Write `data` under a temporary name, then rename it to `path`
async fn write_into_place(
    partial: PathBuf,
    path: &Path,
    data: &Bytes,
) -> Result<(), BlobStoreError> {
    let mut guard = PartialFile::new(partial);
    if let Err(e) = fs::write(guard.path(), data).await {
        guard.remove().await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(guard.path(), path).await {
        guard.remove().await;
        return Err(e.into());
    }
    guard.disarm();

    debug!("Stored {} bytes at {}", data.len(), path.display());
    Ok(())
}

/// Temporary file of an unfinished `put`, deleted unless disarmed
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The file has been renamed into place
    fn disarm(&mut self) {
        self.armed = false;
    }

    async fn remove(&mut self) {
        self.armed = false;
        if let Err(e) = fs::remove_file(&self.path).await {
            log_cleanup_failure(&self.path, &e);
        }
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        // Reached if the write task is torn down with the runtime
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log_cleanup_failure(&self.path, &e);
            }
        }
    }
}

fn log_cleanup_failure(path: &Path, e: &io::Error) {
    if e.kind() != io::ErrorKind::NotFound {
        warn!("Could not remove {}: {}", path.display(), e);
    }
}

fn not_found_or_io(blob_ref: &str, e: io::Error) -> BlobStoreError {
    if e.kind() == io::ErrorKind::NotFound {
        BlobStoreError::NotFound(blob_ref.to_string())
    } else {
        BlobStoreError::Io(e)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, filename: &str, data: Bytes) -> Result<BlobRef, BlobStoreError> {
        let blob_ref = new_blob_ref(filename);
        let path = self.path_of(&blob_ref)?;
        let partial = self.root.join(format!("{}.partial", blob_ref));

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = write_into_place(partial, &path, &data).await;
            if let Err(Ok(())) = done_tx.send(result) {
                // The caller was cancelled, nobody will reference this blob
                debug!("Discarding abandoned blob {}", path.display());
                if let Err(e) = fs::remove_file(&path).await {
                    log_cleanup_failure(&path, &e);
                }
            }
        });

        match done_rx.await {
            Ok(result) => result.map(|()| blob_ref),
            Err(_) => Err(BlobStoreError::Unavailable("write task ended early".into())),
        }
    }

    async fn get(&self, blob_ref: &str) -> Result<Bytes, BlobStoreError> {
        let path = self.path_of(blob_ref)?;
        fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| not_found_or_io(blob_ref, e))
    }

    async fn delete(&self, blob_ref: &str) -> Result<(), BlobStoreError> {
        let path = self.path_of(blob_ref)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(blob_ref, e))
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_creates_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("images").join("nested");

        let store = FsBlobStore::open(&root).await.unwrap();
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(tmp.path()).await.unwrap();

        let blob_ref = store
            .put("C1.jpeg", Bytes::from_static(b"\xff\xd8\xff"))
            .await
            .unwrap();
        assert!(blob_ref.ends_with(".jpeg"));
        assert!(tmp.path().join(&blob_ref).is_file());
        assert_eq!(
            store.get(&blob_ref).await.unwrap(),
            Bytes::from_static(b"\xff\xd8\xff")
        );

        store.delete(&blob_ref).await.unwrap();
        assert!(matches!(
            store.get(&blob_ref).await,
            Err(BlobStoreError::NotFound(_))
        ));
    }

    fn partial_files(root: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(root)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "partial"))
            .collect()
    }

    #[tokio::test]
    async fn test_put_leaves_no_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(tmp.path()).await.unwrap();

        store
            .put("C1.png", Bytes::from_static(b"\x89PNG"))
            .await
            .unwrap();
        assert!(partial_files(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_dropped_partial_file_is_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("abc.png.partial");
        std::fs::write(&path, b"half an image").unwrap();

        drop(PartialFile::new(path.clone()));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_disarmed_partial_file_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("abc.png.partial");
        std::fs::write(&path, b"whole image").unwrap();

        let mut guard = PartialFile::new(path.clone());
        guard.disarm();
        drop(guard);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(tmp.path().join("images")).await.unwrap();
        std::fs::remove_dir(store.root()).unwrap();

        assert!(store.put("C1.png", Bytes::from_static(b"png")).await.is_err());
        assert!(!store.root().exists());
    }

    #[tokio::test]
    async fn test_cancelled_put_leaves_nothing_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(tmp.path()).await.unwrap();
        let data = Bytes::from(vec![0u8; 8 * 1024 * 1024]);

        let cancelled =
            tokio::time::timeout(Duration::from_millis(0), store.put("C1.png", data)).await;
        assert!(cancelled.is_err());

        // The write task finishes on its own and cleans up after itself
        let mut remaining = usize::MAX;
        for _ in 0..200 {
            remaining = std::fs::read_dir(tmp.path()).unwrap().count();
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_refs_cannot_escape_root() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(tmp.path()).await.unwrap();

        assert!(matches!(
            store.get("../secret.png").await,
            Err(BlobStoreError::InvalidRef(_))
        ));
    }
}
