//! Cargo loading
//!
//! A load request arrives as a list of named parts: one JSON declaration per
//! medicine and one image per medicine, correlated by medicine code. Parts are
//! collected and size-checked first ([`collect_parts`]), then handed to the
//! [`LoadingCoordinator`], which reserves the drone and either commits the
//! whole batch or leaves the drone exactly as it was.

mod coordinator;
mod pairing;

pub use coordinator::{LoadingCoordinator, DEFAULT_LOADING_TIMEOUT};
pub use pairing::{collect_parts, pair, ImageUpload, LoadBatch, UploadBuffer, UploadLimits};
