//! Drone registry: the authoritative record of every registered drone
//!
//! This module handles:
//! - Registration with duplicate detection
//! - Snapshot lookups
//! - Per-drone compare-and-swap state transitions, the only way a drone changes

mod manager;

pub use manager::DroneRegistry;
