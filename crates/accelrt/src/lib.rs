//! # accelrt
//!
//! Device memory and asynchronous execution primitives for tensor runtimes:
//! stream-ordered pooled allocation, pinned host buffers, async copies and
//! fills, device-side random fills and event timing.
//!
//! ## Layers
//!
//! - [`Runtime`] - one backend plus the lazily constructed random context
//! - [`global`] / [`install`] - the process-wide runtime
//! - [`api`] - free functions over the process-wide runtime
//! - [`ffi`] - the flat `extern "C"` surface with `u64` handles
//!
//! ## Backends
//!
//! - `sim` - simulated device with explicit per-stream operation logs (always available)
//! - `cuda` - NVIDIA GPUs via cudarc (requires the `cuda` feature)
//!
//! ## Quick Start
//!
//! ```ignore
//! use accelrt::prelude::*;
//!
//! let rt = Runtime::sim(SimConfig::default());
//! let buf = match rt.alloc_async(1024)? {
//!     AllocOutcome::Allocated(ptr) => ptr,
//!     AllocOutcome::OutOfMemory { .. } => return Ok(()),
//! };
//! rt.memset_async(buf, 1024, 0)?;
//! rt.generate_normal(buf, 255, 0.0, 1.0)?;
//! rt.free_async(buf)?;
//! rt.synchronize_device()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod ffi;
mod runtime;

pub use runtime::{global, install, is_installed, Runtime};

pub use accelrt_core::{
    AccelConfig, AccelError, AllocOutcome, Backend, ConfigBuilder, DeviceBackend, DevicePtr,
    ErrorKind, EventHandle, HostPtr, MemInfo, MemcpyKind, RandomGenerator, Result, SimConfig,
    StreamHandle,
};
pub use accelrt_cuda::{cuda_device_count, is_cuda_available};
pub use accelrt_rand::RandomContext;
pub use accelrt_sim::{PoolStats, SimDevice};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::runtime::{global, install, Runtime};
    pub use accelrt_core::prelude::*;
    pub use accelrt_rand::RandomContext;
    pub use accelrt_sim::{PoolStats, SimDevice};
}
