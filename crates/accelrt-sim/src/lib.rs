//! # accelrt Sim
//!
//! A simulated accelerator that implements [`DeviceBackend`] entirely on the
//! host. Device memory is byte-accurate, allocations go through a caching
//! stream-ordered pool, and every stream is an explicit operation log that
//! only executes when joined. That makes ordering bugs observable in tests:
//! data written by an `_async` call is not visible until a synchronize.
//!
//! ```ignore
//! use accelrt_core::prelude::*;
//! use accelrt_sim::SimDevice;
//!
//! let dev = SimDevice::with_defaults();
//! let ptr = dev.alloc_async(1024, StreamHandle::DEFAULT)?.ptr().unwrap();
//! dev.memset_async(ptr, 1024, 0xFF, StreamHandle::DEFAULT)?;
//! dev.synchronize()?;
//! ```
//!
//! [`DeviceBackend`]: accelrt_core::DeviceBackend

#![warn(missing_docs)]
#![warn(clippy::all)]

mod device;
pub mod event;
mod generator;
pub mod host;
pub mod pool;
pub mod queue;

pub use device::SimDevice;
pub use event::EventState;
pub use generator::SimGenerator;
pub use pool::{BlockState, PoolStats};
