//! Dispatch error taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::DroneState;

/// Errors returned by dispatch operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Drone not found: {0}")]
    NotFound(String),

    #[error("Drone already registered: {0}")]
    DuplicateSerialNumber(String),

    #[error("Drone {serial_number} is {actual}, expected {expected}")]
    StateConflict {
        serial_number: String,
        expected: DroneState,
        actual: DroneState,
    },

    #[error("Illegal state transition: {from} -> {to}")]
    IllegalTransition { from: DroneState, to: DroneState },

    #[error("Declarations and images do not pair up: {0}")]
    UnmatchedParts(String),

    #[error("Unsupported image type: {filename} (accepted: jpg, jpeg, png)")]
    UnsupportedMediaType { filename: String },

    #[error("Cargo weight {total_grams} g exceeds limit of {limit_grams} g")]
    CapacityExceeded { total_grams: u64, limit_grams: u32 },

    #[error("Battery at {battery_percentage}% is below the {minimum}% loading minimum")]
    BatteryTooLow { battery_percentage: u8, minimum: u8 },

    #[error("Medicine {code} is already loaded on drone {serial_number}")]
    MedicineAlreadyLoaded { code: String, serial_number: String },

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Loading of drone {0} timed out")]
    LoadingTimedOut(String),

    #[error("Image storage failed: {0}")]
    StorageFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wire-level classification of a [`DispatchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidField,
    NotFound,
    DuplicateSerialNumber,
    StateConflict,
    IllegalTransition,
    UnmatchedParts,
    UnsupportedMediaType,
    CapacityExceeded,
    BatteryTooLow,
    MedicineAlreadyLoaded,
    PayloadTooLarge,
    MalformedRequest,
    LoadingTimedOut,
    StorageFailure,
    Internal,
}

impl ErrorKind {
    /// Whether the failure lies with the system rather than the caller's input
    pub fn is_system_failure(self) -> bool {
        matches!(
            self,
            ErrorKind::LoadingTimedOut | ErrorKind::StorageFailure | ErrorKind::Internal
        )
    }
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::InvalidField { .. } => ErrorKind::InvalidField,
            DispatchError::NotFound(_) => ErrorKind::NotFound,
            DispatchError::DuplicateSerialNumber(_) => ErrorKind::DuplicateSerialNumber,
            DispatchError::StateConflict { .. } => ErrorKind::StateConflict,
            DispatchError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            DispatchError::UnmatchedParts(_) => ErrorKind::UnmatchedParts,
            DispatchError::UnsupportedMediaType { .. } => ErrorKind::UnsupportedMediaType,
            DispatchError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            DispatchError::BatteryTooLow { .. } => ErrorKind::BatteryTooLow,
            DispatchError::MedicineAlreadyLoaded { .. } => ErrorKind::MedicineAlreadyLoaded,
            DispatchError::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            DispatchError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            DispatchError::LoadingTimedOut(_) => ErrorKind::LoadingTimedOut,
            DispatchError::StorageFailure(_) => ErrorKind::StorageFailure,
            DispatchError::Internal(_) => ErrorKind::Internal,
        }
    }
}
