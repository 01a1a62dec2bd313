//! Drone State Machine
//!
//! Defines the legal state transitions of a drone over one dispatch cycle.
//! The machine has no terminal state: a returning drone becomes IDLE again.

use crate::error::DispatchError;
use crate::model::DroneState;

/// Events that move a drone along its dispatch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroneEvent {
    /// A loading request was accepted and reserves the drone
    LoadingRequested,
    /// Cargo was validated and committed
    CargoCommitted,
    /// Loading failed or timed out; the reservation is released
    LoadingAborted,
    /// Drone left with its cargo
    DeliveryStarted,
    /// Cargo handed over
    DeliveryCompleted,
    /// Drone heading back to base
    ReturnStarted,
    /// Drone back at base and available
    ReturnCompleted,
}

impl DroneEvent {
    /// The single `(from, to)` edge this event drives
    pub fn edge(self) -> (DroneState, DroneState) {
        use DroneState::*;

        match self {
            DroneEvent::LoadingRequested => (Idle, Loading),
            DroneEvent::CargoCommitted => (Loading, Loaded),
            DroneEvent::LoadingAborted => (Loading, Idle),
            DroneEvent::DeliveryStarted => (Loaded, Delivering),
            DroneEvent::DeliveryCompleted => (Delivering, Delivered),
            DroneEvent::ReturnStarted => (Delivered, Returning),
            DroneEvent::ReturnCompleted => (Returning, Idle),
        }
    }
}

/// Get the next state for a given event, if the event applies to `state`
pub fn next_state(state: DroneState, event: DroneEvent) -> Option<DroneState> {
    let (from, to) = event.edge();
    (from == state).then_some(to)
}

/// Check if a transition from one state to another is legal
pub fn is_valid_transition(from: DroneState, to: DroneState) -> bool {
    use DroneState::*;

    matches!(
        (from, to),
        (Idle, Loading)
            | (Loading, Loaded)
            | (Loading, Idle)
            | (Loaded, Delivering)
            | (Delivering, Delivered)
            | (Delivered, Returning)
            | (Returning, Idle)
    )
}

/// Like [`is_valid_transition`], reporting `IllegalTransition` on failure
pub fn check_transition(from: DroneState, to: DroneState) -> Result<(), DispatchError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(DispatchError::IllegalTransition { from, to })
    }
}
