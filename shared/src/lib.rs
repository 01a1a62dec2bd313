//! Drone Dispatch Shared Types
//!
//! This crate provides the domain model, loading state machine, cargo
//! validation and wire codec shared between the dispatch server and clients.

pub mod codec;
pub mod error;
pub mod model;
pub mod protocol;
pub mod state_machine;
pub mod validation;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use error::{DispatchError, ErrorKind};
pub use model::{Drone, DroneModel, DroneState, Medicine};
pub use protocol::{DroneView, MedicineView, Request, RequestEnvelope, Response, ResponseEnvelope};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Physical and operational limits of the fleet
pub mod limits {
    /// Longest accepted serial number, in characters
    pub const SERIAL_NUMBER_MAX_LEN: usize = 100;

    /// Smallest weight limit a drone may be registered with
    pub const WEIGHT_LIMIT_MIN_GRAMS: u32 = 1;

    /// Largest weight limit a drone may be registered with
    pub const WEIGHT_LIMIT_MAX_GRAMS: u32 = 500;

    /// Battery levels are percentages
    pub const BATTERY_MAX_PERCENT: u8 = 100;

    /// Below this level a drone cannot complete a delivery cycle and is not loaded
    pub const LOADING_MIN_BATTERY_PERCENT: u8 = 25;

    /// Maximum blob store attempts per image before the load is abandoned
    pub const BLOB_STORE_MAX_ATTEMPTS: u32 = 3;

    /// Delay between blob store attempts
    pub const BLOB_STORE_RETRY_DELAY_MS: u64 = 50;

    /// Image extensions accepted with a cargo item
    pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
}

/// Multipart-style part names used by `loadMedicine`
pub mod parts {
    /// Part carrying one JSON medicine declaration
    pub const MEDICINES: &str = "medicines";

    /// Part carrying one medicine image
    pub const IMAGES: &str = "images";
}
