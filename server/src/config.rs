//! Server configuration
//!
//! Resolved once at startup from the process environment (and a `.env` file,
//! if present) and then passed into the services. Nothing reads environment
//! variables while requests are being handled.

use crate::loading::{UploadLimits, DEFAULT_LOADING_TIMEOUT};
use dispatch_shared::codec;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tokio::time::Duration;

pub const ENV_LISTEN_ADDR: &str = "DISPATCH_LISTEN_ADDR";
pub const ENV_BLOB_DIR: &str = "DISPATCH_BLOB_DIR";
pub const ENV_LOADING_TIMEOUT_MS: &str = "DISPATCH_LOADING_TIMEOUT_MS";
pub const ENV_MAX_IMAGE_BYTES: &str = "DISPATCH_MAX_IMAGE_BYTES";
pub const ENV_MAX_UPLOAD_BYTES: &str = "DISPATCH_MAX_UPLOAD_BYTES";
pub const ENV_MAX_ITEMS: &str = "DISPATCH_MAX_ITEMS";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: {value:?} is not valid ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration of the dispatch server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Directory for stored images; `None` keeps them in memory
    pub blob_dir: Option<PathBuf>,
    pub loading_timeout: Duration,
    pub upload_limits: UploadLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            blob_dir: None,
            loading_timeout: DEFAULT_LOADING_TIMEOUT,
            upload_limits: UploadLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment, reading `.env` first if it exists
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| dotenvy::var(var).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// Unset or empty variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let listen_addr = match value(ENV_LISTEN_ADDR) {
            Some(raw) => parse(ENV_LISTEN_ADDR, &raw)?,
            None => defaults.listen_addr,
        };

        let blob_dir = value(ENV_BLOB_DIR).map(PathBuf::from);

        let loading_timeout = match value(ENV_LOADING_TIMEOUT_MS) {
            Some(raw) => Duration::from_millis(positive(ENV_LOADING_TIMEOUT_MS, &raw)?),
            None => defaults.loading_timeout,
        };

        let mut upload_limits = defaults.upload_limits;
        if let Some(raw) = value(ENV_MAX_IMAGE_BYTES) {
            upload_limits.max_image_bytes = positive(ENV_MAX_IMAGE_BYTES, &raw)?;
        }
        if let Some(raw) = value(ENV_MAX_UPLOAD_BYTES) {
            upload_limits.max_total_bytes = positive(ENV_MAX_UPLOAD_BYTES, &raw)?;
        }
        if let Some(raw) = value(ENV_MAX_ITEMS) {
            upload_limits.max_items = positive(ENV_MAX_ITEMS, &raw)?;
        }

        if upload_limits.max_image_bytes > upload_limits.max_total_bytes {
            return Err(ConfigError::InvalidValue {
                var: ENV_MAX_IMAGE_BYTES,
                value: upload_limits.max_image_bytes.to_string(),
                reason: format!(
                    "larger than {} ({})",
                    ENV_MAX_UPLOAD_BYTES, upload_limits.max_total_bytes
                ),
            });
        }

        let max_frame = codec::MAX_MESSAGE_SIZE as usize;
        if upload_limits.max_frame_bytes() > max_frame {
            return Err(ConfigError::InvalidValue {
                var: ENV_MAX_UPLOAD_BYTES,
                value: upload_limits.max_total_bytes.to_string(),
                reason: format!(
                    "needs {} byte frames, above the {} byte frame limit",
                    upload_limits.max_frame_bytes(),
                    max_frame
                ),
            });
        }

        Ok(Self {
            listen_addr,
            blob_dir,
            loading_timeout,
            upload_limits,
        })
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn positive<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let parsed: T = parse(var, raw)?;
    if parsed == T::default() {
        return Err(ConfigError::InvalidValue {
            var,
            value: raw.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(parsed)
}
