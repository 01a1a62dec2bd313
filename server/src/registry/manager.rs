//! Registry of all drones known to the dispatch server

use dispatch_shared::state_machine;
use dispatch_shared::{DispatchError, Drone, DroneModel, DroneState, Medicine};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Owns every drone and mediates all changes to them.
///
/// The map lock is only held to insert or look up an entry. Each drone sits
/// behind its own mutex, so transitions on different drones never wait on
/// each other.
pub struct DroneRegistry {
    /// Map of serial number -> drone
    drones: RwLock<HashMap<String, Arc<Mutex<Drone>>>>,
    /// Map of medicine code -> serial number of the drone holding it
    loaded_codes: Mutex<HashMap<String, String>>,
}

impl DroneRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            drones: RwLock::new(HashMap::new()),
            loaded_codes: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new drone in state IDLE with no cargo
    pub async fn register(
        &self,
        serial_number: &str,
        model: DroneModel,
        weight_limit_grams: i64,
        battery_percentage: i64,
    ) -> Result<Drone, DispatchError> {
        let drone = Drone::register(serial_number, model, weight_limit_grams, battery_percentage)?;

        let mut drones = self.drones.write().await;
        match drones.entry(drone.serial_number().to_string()) {
            Entry::Occupied(_) => Err(DispatchError::DuplicateSerialNumber(
                serial_number.to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(drone.clone())));
                info!(
                    "Drone registered: {} ({:?}, limit {} g, battery {}%)",
                    serial_number,
                    drone.model(),
                    drone.weight_limit_grams(),
                    drone.battery_percentage()
                );
                Ok(drone)
            }
        }
    }

    /// Get a snapshot of a drone
    pub async fn get(&self, serial_number: &str) -> Result<Drone, DispatchError> {
        let entry = self.entry(serial_number).await?;
        let drone = entry.lock().await;
        Ok(drone.clone())
    }

    /// Atomically move a drone from `expected` to `new_state`, replacing its cargo.
    ///
    /// Fails with `StateConflict` if the drone is not in `expected` at the
    /// moment of the swap, and with `IllegalTransition` if the edge is not
    /// part of the state machine. On failure the drone is untouched.
    pub async fn transition_and_commit_cargo(
        &self,
        serial_number: &str,
        expected: DroneState,
        new_state: DroneState,
        cargo: Vec<Medicine>,
    ) -> Result<Drone, DispatchError> {
        self.compare_and_swap(serial_number, expected, new_state, Some(cargo))
            .await
    }

    /// Compare-and-swap a lifecycle transition without supplying new cargo.
    ///
    /// Cargo is kept when the target state may hold cargo and dropped otherwise.
    pub async fn transition(
        &self,
        serial_number: &str,
        expected: DroneState,
        new_state: DroneState,
    ) -> Result<Drone, DispatchError> {
        self.compare_and_swap(serial_number, expected, new_state, None)
            .await
    }

    /// Reserve medicine codes for a drone.
    ///
    /// All-or-nothing: if any code is held by a different drone nothing is
    /// claimed. Claims are dropped again once the drone's cargo is emptied.
    pub async fn claim_codes(
        &self,
        serial_number: &str,
        codes: &[&str],
    ) -> Result<(), DispatchError> {
        let mut loaded = self.loaded_codes.lock().await;
        Self::check_codes_free(&loaded, serial_number, codes.iter().copied())?;
        for code in codes {
            loaded.insert(code.to_string(), serial_number.to_string());
        }
        Ok(())
    }

    /// Serial number of the drone currently holding `code`, if any
    pub async fn holder_of(&self, code: &str) -> Option<String> {
        self.loaded_codes.lock().await.get(code).cloned()
    }

    /// `cargo: None` keeps the current cargo if `new_state` may carry it.
    ///
    /// Lock order is drone, then code index.
    async fn compare_and_swap(
        &self,
        serial_number: &str,
        expected: DroneState,
        new_state: DroneState,
        cargo: Option<Vec<Medicine>>,
    ) -> Result<Drone, DispatchError> {
        state_machine::check_transition(expected, new_state)?;

        let entry = self.entry(serial_number).await?;
        let mut drone = entry.lock().await;

        if drone.state() != expected {
            return Err(DispatchError::StateConflict {
                serial_number: serial_number.to_string(),
                expected,
                actual: drone.state(),
            });
        }

        let cargo = match cargo {
            Some(cargo) => cargo,
            None if new_state.may_carry_cargo() => drone.cargo().to_vec(),
            None => Vec::new(),
        };

        let mut loaded = self.loaded_codes.lock().await;
        Self::check_codes_free(&loaded, serial_number, cargo.iter().map(Medicine::code))?;
        drone.replace_cargo(new_state, cargo)?;

        loaded.retain(|_, holder| holder.as_str() != serial_number);
        for medicine in drone.cargo() {
            loaded.insert(medicine.code().to_string(), serial_number.to_string());
        }
        drop(loaded);

        debug!("[{}] {} -> {}", serial_number, expected, new_state);
        Ok(drone.clone())
    }

    fn check_codes_free<'a>(
        loaded: &HashMap<String, String>,
        serial_number: &str,
        codes: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), DispatchError> {
        for code in codes {
            if let Some(holder) = loaded.get(code) {
                if holder != serial_number {
                    return Err(DispatchError::MedicineAlreadyLoaded {
                        code: code.to_string(),
                        serial_number: holder.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Get the number of registered drones
    pub async fn len(&self) -> usize {
        self.drones.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.drones.read().await.is_empty()
    }

    /// Get all registered serial numbers, sorted
    pub async fn serial_numbers(&self) -> Vec<String> {
        let drones = self.drones.read().await;
        let mut serials: Vec<String> = drones.keys().cloned().collect();
        serials.sort();
        serials
    }

    async fn entry(&self, serial_number: &str) -> Result<Arc<Mutex<Drone>>, DispatchError> {
        let drones = self.drones.read().await;
        drones
            .get(serial_number)
            .cloned()
            .ok_or_else(|| DispatchError::NotFound(serial_number.to_string()))
    }
}

impl Default for DroneRegistry {
    fn default() -> Self {
        Self::new()
    }
}
