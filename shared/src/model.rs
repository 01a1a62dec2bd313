//! Drone and cargo data model

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DispatchError;
use crate::validation;

/// Drone weight class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DroneModel {
    Lightweight,
    Middleweight,
    Cruiserweight,
    Heavyweight,
}

/// Operational state of a drone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DroneState {
    Idle,
    Loading,
    Loaded,
    Delivering,
    Delivered,
    Returning,
}

impl DroneState {
    /// States in which a drone may hold cargo
    pub fn may_carry_cargo(self) -> bool {
        matches!(self, DroneState::Loaded | DroneState::Delivering)
    }
}

impl fmt::Display for DroneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DroneState::Idle => "IDLE",
            DroneState::Loading => "LOADING",
            DroneState::Loaded => "LOADED",
            DroneState::Delivering => "DELIVERING",
            DroneState::Delivered => "DELIVERED",
            DroneState::Returning => "RETURNING",
        };
        f.write_str(name)
    }
}

/// A single loaded cargo item
///
/// Only created by a successful loading commit; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Medicine {
    name: String,
    weight_grams: u32,
    code: String,
    image_ref: String,
}

impl Medicine {
    pub fn new(
        name: impl Into<String>,
        weight_grams: u32,
        code: impl Into<String>,
        image_ref: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            weight_grams,
            code: code.into(),
            image_ref: image_ref.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight_grams(&self) -> u32 {
        self.weight_grams
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Blob store reference of the item's image
    pub fn image_ref(&self) -> &str {
        &self.image_ref
    }
}

/// A registered drone
///
/// Values of this type handed out by the registry are snapshots: changing one
/// never affects the registry's copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drone {
    serial_number: String,
    model: DroneModel,
    weight_limit_grams: u32,
    battery_percentage: u8,
    state: DroneState,
    cargo: Vec<Medicine>,
}

impl Drone {
    /// Create a freshly registered drone: IDLE with no cargo.
    pub fn register(
        serial_number: impl Into<String>,
        model: DroneModel,
        weight_limit_grams: i64,
        battery_percentage: i64,
    ) -> Result<Self, DispatchError> {
        let serial_number = serial_number.into();
        let (weight_limit_grams, battery_percentage) =
            validation::validate_registration(&serial_number, weight_limit_grams, battery_percentage)?;

        Ok(Self {
            serial_number,
            model,
            weight_limit_grams,
            battery_percentage,
            state: DroneState::Idle,
            cargo: Vec::new(),
        })
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn model(&self) -> DroneModel {
        self.model
    }

    pub fn weight_limit_grams(&self) -> u32 {
        self.weight_limit_grams
    }

    pub fn battery_percentage(&self) -> u8 {
        self.battery_percentage
    }

    pub fn state(&self) -> DroneState {
        self.state
    }

    pub fn cargo(&self) -> &[Medicine] {
        &self.cargo
    }

    /// Total weight of the current cargo
    pub fn cargo_weight_grams(&self) -> u64 {
        total_weight_grams(&self.cargo)
    }

    /// Replace state and cargo together, enforcing the cargo invariants.
    ///
    /// Cargo may only be held in LOADED or DELIVERING and never weighs more
    /// than the weight limit. On error nothing is changed.
    pub fn replace_cargo(
        &mut self,
        state: DroneState,
        cargo: Vec<Medicine>,
    ) -> Result<(), DispatchError> {
        if !cargo.is_empty() && !state.may_carry_cargo() {
            return Err(DispatchError::InvalidField {
                field: "cargo",
                reason: format!("a {} drone cannot hold cargo", state),
            });
        }

        let total_grams = total_weight_grams(&cargo);
        if total_grams > u64::from(self.weight_limit_grams) {
            return Err(DispatchError::CapacityExceeded {
                total_grams,
                limit_grams: self.weight_limit_grams,
            });
        }

        self.state = state;
        self.cargo = cargo;
        Ok(())
    }
}

/// Sum of item weights, widened so that many items cannot overflow
pub fn total_weight_grams(cargo: &[Medicine]) -> u64 {
    cargo.iter().map(|m| u64::from(m.weight_grams)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drone() -> Drone {
        Drone::register("1TEST3R002016J", DroneModel::Middleweight, 250, 100).unwrap()
    }

    #[test]
    fn test_registered_drone_is_idle_and_empty() {
        let drone = drone();
        assert_eq!(drone.state(), DroneState::Idle);
        assert!(drone.cargo().is_empty());
        assert_eq!(drone.cargo_weight_grams(), 0);
    }

    #[test]
    fn test_register_rejects_out_of_range_weight_limit() {
        let err = Drone::register("D1", DroneModel::Heavyweight, 501, 50).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidField { field: "weightLimitGrams", .. }));
    }

    #[test]
    fn test_replace_cargo_commits_state_and_items() {
        let mut drone = drone();
        let cargo = vec![
            Medicine::new("first_medicine", 10, "C1", "ref-1"),
            Medicine::new("second_medicine", 15, "C2", "ref-2"),
        ];

        drone.replace_cargo(DroneState::Loaded, cargo).unwrap();

        assert_eq!(drone.state(), DroneState::Loaded);
        assert_eq!(drone.cargo_weight_grams(), 25);
        assert_eq!(drone.cargo()[0].code(), "C1");
    }

    #[test]
    fn test_replace_cargo_rejects_cargo_in_idle() {
        let mut drone = drone();
        let cargo = vec![Medicine::new("aspirin", 10, "C1", "ref-1")];

        let err = drone.replace_cargo(DroneState::Idle, cargo).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidField { field: "cargo", .. }));
        assert!(drone.cargo().is_empty());
    }

    #[test]
    fn test_replace_cargo_rejects_overweight() {
        let mut drone = drone();
        let cargo = vec![Medicine::new("heavy", 251, "C1", "ref-1")];

        let err = drone.replace_cargo(DroneState::Loaded, cargo).unwrap_err();
        assert!(matches!(err, DispatchError::CapacityExceeded { total_grams: 251, limit_grams: 250 }));
        assert_eq!(drone.state(), DroneState::Idle);
    }

    #[test]
    fn test_state_display_matches_wire_names() {
        assert_eq!(DroneState::Returning.to_string(), "RETURNING");
        assert_eq!(
            serde_json::to_string(&DroneState::Loading).unwrap(),
            "\"LOADING\""
        );
        assert_eq!(
            serde_json::to_string(&DroneModel::Middleweight).unwrap(),
            "\"MIDDLEWEIGHT\""
        );
    }
}
