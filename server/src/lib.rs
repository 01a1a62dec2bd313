//! Drone Dispatch Server
//!
//! Keeps the fleet registry, runs cargo loading and answers drone lookups
//! for clients connected over TCP.

pub mod blob;
pub mod config;
pub mod loading;
pub mod query;
pub mod registry;
pub mod session;

use blob::{BlobStore, BlobStoreError, FsBlobStore, MemoryBlobStore};
use config::ServerConfig;
use loading::LoadingCoordinator;
use query::QueryService;
use registry::DroneRegistry;
use session::RequestHandler;
use std::sync::Arc;
use tracing::info;

/// Open the blob store selected by the configuration
pub async fn open_blob_store(config: &ServerConfig) -> Result<Arc<dyn BlobStore>, BlobStoreError> {
    let store: Arc<dyn BlobStore> = match &config.blob_dir {
        Some(dir) => Arc::new(FsBlobStore::open(dir).await?),
        None => Arc::new(MemoryBlobStore::new()),
    };
    info!("Blob store: {}", store.name());
    Ok(store)
}

/// Wire the services together around an empty registry
pub fn build_handler(config: &ServerConfig, blob_store: Arc<dyn BlobStore>) -> RequestHandler {
    let registry = Arc::new(DroneRegistry::new());
    let coordinator =
        LoadingCoordinator::new(registry.clone(), blob_store, config.loading_timeout);
    let query = QueryService::new(registry.clone());

    RequestHandler::new(registry, coordinator, query, config.upload_limits)
}
