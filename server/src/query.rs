//! Read-only queries over the registry

use crate::registry::DroneRegistry;
use dispatch_shared::{DispatchError, Drone};
use std::sync::Arc;
use tracing::debug;

/// Answers lookups without ever changing a drone
pub struct QueryService {
    registry: Arc<DroneRegistry>,
}

impl QueryService {
    pub fn new(registry: Arc<DroneRegistry>) -> Self {
        Self { registry }
    }

    /// Get a consistent snapshot of a drone.
    ///
    /// A drone that is being loaded reports LOADING with its previous cargo.
    /// Image bytes are never part of the result, only their references.
    pub async fn get_drone(&self, serial_number: &str) -> Result<Drone, DispatchError> {
        let drone = self.registry.get(serial_number).await?;
        debug!(
            "[{}] Lookup: {} with {} medicines",
            serial_number,
            drone.state(),
            drone.cargo().len()
        );
        Ok(drone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_shared::{DroneModel, DroneState, Medicine};

    async fn service_with_loaded_drone() -> (Arc<DroneRegistry>, QueryService) {
        let registry = Arc::new(DroneRegistry::new());
        registry
            .register("D1", DroneModel::Lightweight, 100, 80)
            .await
            .unwrap();
        registry
            .transition("D1", DroneState::Idle, DroneState::Loading)
            .await
            .unwrap();
        registry
            .transition_and_commit_cargo(
                "D1",
                DroneState::Loading,
                DroneState::Loaded,
                vec![Medicine::new("aspirin", 20, "C1", "0f3a.png")],
            )
            .await
            .unwrap();

        (registry.clone(), QueryService::new(registry))
    }

    #[tokio::test]
    async fn test_get_drone() {
        let (_, service) = service_with_loaded_drone().await;

        let drone = service.get_drone("D1").await.unwrap();
        assert_eq!(drone.state(), DroneState::Loaded);
        assert_eq!(drone.cargo()[0].code(), "C1");
    }

    #[tokio::test]
    async fn test_get_unknown_drone() {
        let (_, service) = service_with_loaded_drone().await;

        assert_eq!(
            service.get_drone("nope").await.unwrap_err(),
            DispatchError::NotFound("nope".into())
        );
    }

    #[tokio::test]
    async fn test_snapshot_is_detached_from_registry() {
        let (registry, service) = service_with_loaded_drone().await;
        let before = service.get_drone("D1").await.unwrap();

        registry
            .transition("D1", DroneState::Loaded, DroneState::Delivering)
            .await
            .unwrap();

        assert_eq!(before.state(), DroneState::Loaded);
        assert_eq!(
            service.get_drone("D1").await.unwrap().state(),
            DroneState::Delivering
        );
    }
}
