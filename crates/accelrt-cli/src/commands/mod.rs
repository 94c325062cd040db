//! CLI command implementations.

pub mod bench_copy;
pub mod info;
pub mod random;
pub mod trim;

use std::sync::Arc;

use accelrt::{AccelConfig, AllocOutcome, DevicePtr, Runtime, SimDevice};
use tracing::debug;

use crate::error::{CliError, CliResult};

/// Runtime opened for one command.
pub struct Session {
    /// The runtime every command drives.
    pub runtime: Runtime,
    /// The simulated device behind `runtime`, when the simulator was chosen.
    pub sim: Option<SimDevice>,
}

impl Session {
    /// Open the backend described by `--config` / `--backend`.
    pub fn open(config_path: Option<&str>, backend: Option<&str>) -> CliResult<Self> {
        let mut config = match config_path {
            Some(path) => AccelConfig::load(path)?,
            None => AccelConfig::from_env()?,
        };
        if let Some(backend) = backend {
            config.backend = backend.to_string();
        }
        config.validate()?;
        debug!(backend = %config.backend, "Opening session");

        let use_sim = config.backend == "sim"
            || (config.backend == "auto" && !accelrt::is_cuda_available());
        if use_sim {
            let dev = SimDevice::new(config.sim.clone());
            let runtime = Runtime::new(Arc::new(dev.clone()));
            return Ok(Self {
                runtime,
                sim: Some(dev),
            });
        }

        Ok(Self {
            runtime: Runtime::from_config(&config)?,
            sim: None,
        })
    }

    /// Allocate `bytes` on the default stream, treating out-of-memory as an error.
    pub fn alloc(&self, bytes: u64) -> CliResult<DevicePtr> {
        match self.runtime.alloc_async(bytes)? {
            AllocOutcome::Allocated(ptr) => Ok(ptr),
            AllocOutcome::OutOfMemory { requested } => Err(CliError::OutOfMemory(requested)),
        }
    }
}

/// Parse a byte size such as `4096`, `64K`, `16M` or `1G`.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let s = input.trim();
    let (digits, shift) = match s.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&s[..s.len() - 1], 10),
        Some('M') => (&s[..s.len() - 1], 20),
        Some('G') => (&s[..s.len() - 1], 30),
        _ => (s, 0),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a byte size", input))?;
    value
        .checked_mul(1u64 << shift)
        .ok_or_else(|| format!("'{}' is too large", input))
}

/// Format a byte count for humans.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("64K").unwrap(), 64 * 1024);
        assert_eq!(parse_size("16m").unwrap(), 16 << 20);
        assert_eq!(parse_size("1G").unwrap(), 1 << 30);
        assert!(parse_size("lots").is_err());
        assert!(parse_size("").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(3 << 20), "3.00 MiB");
    }

    #[test]
    fn test_open_sim_session() {
        let session = Session::open(None, Some("sim")).unwrap();
        assert!(session.sim.is_some());
        assert!(Session::open(None, Some("metal")).is_err());
    }
}
