//! Maps decoded requests onto registry, loading and query operations

use crate::loading::{collect_parts, LoadingCoordinator, UploadLimits};
use crate::query::QueryService;
use crate::registry::DroneRegistry;
use dispatch_shared::protocol::{DroneLookup, LoadMedicine, RegisterDrone};
use dispatch_shared::{DispatchError, Drone, Request, Response};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared by every connection of a server
pub struct RequestHandler {
    registry: Arc<DroneRegistry>,
    coordinator: LoadingCoordinator,
    query: QueryService,
    limits: UploadLimits,
}

impl RequestHandler {
    pub fn new(
        registry: Arc<DroneRegistry>,
        coordinator: LoadingCoordinator,
        query: QueryService,
        limits: UploadLimits,
    ) -> Self {
        Self {
            registry,
            coordinator,
            query,
            limits,
        }
    }

    pub fn registry(&self) -> &Arc<DroneRegistry> {
        &self.registry
    }

    /// Run one request to completion
    pub async fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::Register(req) => self.register(req).await,
            Request::LoadMedicine(req) => self.load_medicine(req).await,
            Request::GetDrone(req) => self.get_drone(req).await,
        };

        if let Err(e) = &result {
            if e.kind().is_system_failure() {
                warn!("Request failed: {}", e);
            }
        }
        Response::from(result)
    }

    async fn register(&self, req: RegisterDrone) -> Result<Drone, DispatchError> {
        self.registry
            .register(
                &req.serial_number,
                req.model,
                req.weight_limit_grams,
                req.battery_percentage,
            )
            .await
    }

    async fn load_medicine(&self, req: LoadMedicine) -> Result<Drone, DispatchError> {
        // Bound and sort the upload before the drone is touched
        let batch = collect_parts(req.parts, self.limits)?;
        let drone = self.coordinator.load_medicine(&req.serial_number, batch).await?;
        info!(
            "[{}] Now {} with {} medicines",
            drone.serial_number(),
            drone.state(),
            drone.cargo().len()
        );
        Ok(drone)
    }

    async fn get_drone(&self, req: DroneLookup) -> Result<Drone, DispatchError> {
        self.query.get_drone(&req.serial_number).await
    }
}
