//! Engine configuration, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bridge::Direction;
use crate::buffers::coerce_pow2;
use crate::device::DeviceClass;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Initial engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Requested transform length; coerced up to a power of two.
    pub size: u32,
    pub device: DeviceClass,
    pub direction: Direction,
    /// Capacity of the configuration request queue.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            size: 8192,
            device: DeviceClass::Gpu,
            direction: Direction::Forward,
            queue_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Coerce `size` to a power of two and check the queue capacity.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let size = coerce_pow2(self.size).ok_or_else(|| {
            ConfigError::Invalid(format!("size {} has no power-of-two length", self.size))
        })?;
        if size != self.size {
            log::info!("Transform size {} coerced to {}", self.size, size);
            self.size = size;
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
