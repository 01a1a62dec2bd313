//! Loading coordinator - reserves a drone, validates cargo and commits it

use super::pairing::{self, LoadBatch};
use crate::blob::{self, BlobRef, BlobStore};
use crate::registry::DroneRegistry;
use dispatch_shared::state_machine::DroneEvent;
use dispatch_shared::{limits, validation, DispatchError, Drone, Medicine};
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

/// Default bound on one loading operation, reservation to commit
pub const DEFAULT_LOADING_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the loading protocol for cargo requests
pub struct LoadingCoordinator {
    registry: Arc<DroneRegistry>,
    blob_store: Arc<dyn BlobStore>,
    loading_timeout: Duration,
}

impl LoadingCoordinator {
    /// Create a new loading coordinator
    pub fn new(
        registry: Arc<DroneRegistry>,
        blob_store: Arc<dyn BlobStore>,
        loading_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            blob_store,
            loading_timeout,
        }
    }

    /// Load a batch of medicines onto a drone.
    ///
    /// The drone is reserved (IDLE -> LOADING) before anything else is
    /// checked, so a second request for the same drone fails with
    /// `StateConflict` while this one runs. Checks run in this order:
    /// pairing, item validation, capacity, battery, then the medicine codes
    /// are claimed so no other drone can carry them. Any failure releases
    /// the reservation and its claims with the cargo unchanged.
    ///
    /// Everything after the reservation runs in its own task: if the caller
    /// goes away, the load still commits or rolls back.
    pub async fn load_medicine(
        &self,
        serial_number: &str,
        batch: LoadBatch,
    ) -> Result<Drone, DispatchError> {
        let drone = self.registry.get(serial_number).await?;

        let (idle, loading) = DroneEvent::LoadingRequested.edge();
        if let Err(e) = self.registry.transition(serial_number, idle, loading).await {
            warn!("[{}] Loading rejected: {}", serial_number, e);
            return Err(e);
        }

        info!(
            "[{}] Loading {} medicines ({} images)",
            serial_number,
            batch.declarations.len(),
            batch.images.len()
        );

        let task = tokio::spawn(run_reserved(
            self.registry.clone(),
            self.blob_store.clone(),
            self.loading_timeout,
            drone,
            batch,
        ));

        match task.await {
            Ok(result) => result,
            Err(e) => {
                // The task only ends without a result if it panicked or the
                // runtime is shutting down
                error!("[{}] Loading task failed: {}", serial_number, e);
                release(&self.registry, serial_number).await;
                Err(DispatchError::Internal(format!("loading task failed: {}", e)))
            }
        }
    }
}

/// Drive a reserved drone to LOADED, or back to IDLE on any failure
async fn run_reserved(
    registry: Arc<DroneRegistry>,
    blob_store: Arc<dyn BlobStore>,
    loading_timeout: Duration,
    drone: Drone,
    batch: LoadBatch,
) -> Result<Drone, DispatchError> {
    let serial_number = drone.serial_number().to_string();
    let mut stored: Vec<BlobRef> = Vec::new();

    let result = match timeout(
        loading_timeout,
        load_reserved(&registry, blob_store.as_ref(), &drone, batch, &mut stored),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(DispatchError::LoadingTimedOut(serial_number.clone())),
    };

    match &result {
        Ok(loaded) => {
            info!(
                "[{}] Loaded {} medicines ({} g of {} g)",
                serial_number,
                loaded.cargo().len(),
                loaded.cargo_weight_grams(),
                loaded.weight_limit_grams()
            );
        }
        Err(e) => {
            warn!("[{}] Loading failed, releasing drone: {}", serial_number, e);
            discard_blobs(blob_store.as_ref(), &stored).await;
            release(&registry, &serial_number).await;
        }
    }

    result
}

/// Steps of the loading protocol that run while the drone is reserved
async fn load_reserved(
    registry: &DroneRegistry,
    blob_store: &dyn BlobStore,
    drone: &Drone,
    batch: LoadBatch,
    stored: &mut Vec<BlobRef>,
) -> Result<Drone, DispatchError> {
    let pairs = pairing::pair(batch)?;

    let mut weights = Vec::with_capacity(pairs.len());
    for (declaration, image) in &pairs {
        weights.push(validation::validate_item(declaration, &image.filename)?);
    }

    let total_grams: u64 = weights.iter().map(|w| u64::from(*w)).sum();
    if total_grams > u64::from(drone.weight_limit_grams()) {
        return Err(DispatchError::CapacityExceeded {
            total_grams,
            limit_grams: drone.weight_limit_grams(),
        });
    }

    if drone.battery_percentage() < limits::LOADING_MIN_BATTERY_PERCENT {
        return Err(DispatchError::BatteryTooLow {
            battery_percentage: drone.battery_percentage(),
            minimum: limits::LOADING_MIN_BATTERY_PERCENT,
        });
    }

    let codes: Vec<&str> = pairs.iter().map(|(d, _)| d.code.as_str()).collect();
    registry.claim_codes(drone.serial_number(), &codes).await?;

    let mut cargo = Vec::with_capacity(pairs.len());
    for ((declaration, image), weight_grams) in pairs.into_iter().zip(weights) {
        let image_ref = blob::put_with_retry(blob_store, &image.filename, image.data)
            .await
            .map_err(|e| {
                error!(
                    "[{}] Storing image {} failed: {}",
                    drone.serial_number(),
                    image.filename,
                    e
                );
                DispatchError::StorageFailure(e.to_string())
            })?;
        stored.push(image_ref.clone());
        cargo.push(Medicine::new(
            declaration.name,
            weight_grams,
            declaration.code,
            image_ref,
        ));
    }

    let (loading, loaded) = DroneEvent::CargoCommitted.edge();
    registry
        .transition_and_commit_cargo(drone.serial_number(), loading, loaded, cargo)
        .await
}

/// Release a reservation: LOADING -> IDLE
async fn release(registry: &DroneRegistry, serial_number: &str) {
    let (loading, idle) = DroneEvent::LoadingAborted.edge();
    if let Err(e) = registry.transition(serial_number, loading, idle).await {
        error!("[{}] Failed to release drone: {}", serial_number, e);
    }
}

/// Best-effort removal of images stored by a failed load
async fn discard_blobs(blob_store: &dyn BlobStore, stored: &[BlobRef]) {
    let results = join_all(stored.iter().map(|blob_ref| blob_store.delete(blob_ref))).await;
    for (blob_ref, result) in stored.iter().zip(results) {
        if let Err(e) = result {
            warn!("Could not discard image {}: {}", blob_ref, e);
        }
    }
}
