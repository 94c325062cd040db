//! # accelrt Core
//!
//! Handle types, error taxonomy and backend traits shared by every accelrt
//! backend.
//!
//! ## Core Abstractions
//!
//! - [`DeviceBackend`] - Stream-ordered allocation, copies, fills, events
//! - [`RandomGenerator`] - Device-side random fills on a dedicated queue
//! - [`DevicePtr`], [`HostPtr`], [`StreamHandle`], [`EventHandle`] - Opaque 64-bit handles
//! - [`AllocOutcome`] - Pooled allocation result with out-of-memory kept out of the error channel
//! - [`AccelError`] - One variant per failure category

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod error;
pub mod memory;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::{Backend, DeviceBackend, RandomGenerator};
    pub use crate::config::{AccelConfig, ConfigBuilder, SimConfig};
    pub use crate::error::{AccelError, ErrorKind, Result};
    pub use crate::memory::{
        AllocOutcome, DevicePtr, EventHandle, HostPtr, MemInfo, MemcpyKind, StreamHandle,
    };
}

// Re-exports for convenience
pub use backend::{Backend, DeviceBackend, RandomGenerator};
pub use config::{AccelConfig, ConfigBuilder, SimConfig};
pub use error::{AccelError, ErrorKind, Result};
pub use memory::{AllocOutcome, DevicePtr, EventHandle, HostPtr, MemInfo, MemcpyKind, StreamHandle};
