//! Runtime configuration.
//!
//! Loaded from TOML files or strings with `ACCELRT__`-prefixed environment
//! overrides, or built programmatically with [`ConfigBuilder`].
//!
//! ```ignore
//! use accelrt_core::config::AccelConfig;
//!
//! let config = AccelConfig::load("accelrt.toml")?;
//! config.validate()?;
//! ```

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{AccelError, Result};

const ENV_PREFIX: &str = "ACCELRT";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccelConfig {
    /// Backend to use (sim, cuda, auto).
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Device ordinal.
    #[serde(default)]
    pub device_id: usize,

    /// Simulated device parameters.
    #[serde(default)]
    pub sim: SimConfig,
}

fn default_backend() -> String {
    "auto".to_string()
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            device_id: 0,
            sim: SimConfig::default(),
        }
    }
}

/// Parameters of the simulated device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Total device memory in bytes.
    #[serde(default = "default_total_memory")]
    pub total_memory_bytes: u64,

    /// Allocation granularity in bytes. Requests are rounded up to a multiple.
    #[serde(default = "default_granularity")]
    pub allocation_granularity: u64,

    /// Maximum pinned host memory in bytes.
    #[serde(default = "default_pinned_limit")]
    pub pinned_limit_bytes: u64,

    /// Simulated transfer rate used to advance the device clock.
    #[serde(default = "default_bytes_per_ms")]
    pub bytes_per_ms: u64,
}

fn default_total_memory() -> u64 {
    256 * 1024 * 1024
}

fn default_granularity() -> u64 {
    256
}

fn default_pinned_limit() -> u64 {
    64 * 1024 * 1024
}

fn default_bytes_per_ms() -> u64 {
    // ~12 GB/s
    12 * 1024 * 1024
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            total_memory_bytes: default_total_memory(),
            allocation_granularity: default_granularity(),
            pinned_limit_bytes: default_pinned_limit(),
            bytes_per_ms: default_bytes_per_ms(),
        }
    }
}

impl SimConfig {
    /// Creates a small configuration for tests.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            total_memory_bytes: 16 * 1024 * 1024,
            allocation_granularity: 256,
            pinned_limit_bytes: 4 * 1024 * 1024,
            bytes_per_ms: default_bytes_per_ms(),
        }
    }
}

impl AccelConfig {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load configuration with fallback to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Create from environment variables only.
    pub fn from_env() -> Result<Self> {
        let builder =
            Config::builder().add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let valid_backends = ["sim", "cuda", "auto"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(AccelError::InvalidConfig(format!(
                "Invalid backend '{}'. Valid options: {:?}",
                self.backend, valid_backends
            )));
        }

        if self.sim.total_memory_bytes == 0 {
            return Err(AccelError::InvalidConfig(
                "Simulated device memory must be greater than 0".to_string(),
            ));
        }

        if !self.sim.allocation_granularity.is_power_of_two() {
            return Err(AccelError::InvalidConfig(format!(
                "Allocation granularity {} is not a power of two",
                self.sim.allocation_granularity
            )));
        }

        if self.sim.bytes_per_ms == 0 {
            return Err(AccelError::InvalidConfig(
                "Simulated transfer rate must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration builder for programmatic configuration.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: AccelConfig,
}

impl ConfigBuilder {
    /// Create a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend.
    #[must_use]
    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.config.backend = backend.into();
        self
    }

    /// Set the device ordinal.
    #[must_use]
    pub fn device_id(mut self, id: usize) -> Self {
        self.config.device_id = id;
        self
    }

    /// Set simulated device memory.
    #[must_use]
    pub fn sim_total_memory(mut self, bytes: u64) -> Self {
        self.config.sim.total_memory_bytes = bytes;
        self
    }

    /// Set simulated allocation granularity.
    #[must_use]
    pub fn sim_granularity(mut self, bytes: u64) -> Self {
        self.config.sim.allocation_granularity = bytes;
        self
    }

    /// Set simulated pinned host limit.
    #[must_use]
    pub fn sim_pinned_limit(mut self, bytes: u64) -> Self {
        self.config.sim.pinned_limit_bytes = bytes;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<AccelConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AccelConfig::default();
        assert_eq!(config.backend, "auto");
        assert_eq!(config.device_id, 0);
        assert_eq!(config.sim.allocation_granularity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut invalid = AccelConfig::default();
        invalid.backend = "opencl".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = AccelConfig::default();
        invalid.sim.allocation_granularity = 300;
        assert!(invalid.validate().is_err());

        let mut invalid = AccelConfig::default();
        invalid.sim.total_memory_bytes = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .backend("sim")
            .device_id(1)
            .sim_total_memory(1 << 20)
            .build()
            .unwrap();

        assert_eq!(config.backend, "sim");
        assert_eq!(config.device_id, 1);
        assert_eq!(config.sim.total_memory_bytes, 1 << 20);
    }

    #[test]
    fn test_load_from_str() {
        let toml = r#"
            backend = "sim"
            device_id = 2

            [sim]
            total_memory_bytes = 1048576
        "#;

        let config = AccelConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.backend, "sim");
        assert_eq!(config.device_id, 2);
        assert_eq!(config.sim.total_memory_bytes, 1_048_576);
        assert_eq!(config.sim.allocation_granularity, 256);
    }

    #[test]
    fn test_serde_json_shape() {
        let config = AccelConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["backend"], "auto");
        assert!(json["sim"]["total_memory_bytes"].is_u64());
    }
}
