//! Backend traits.
//!
//! A backend owns one accelerator device: its memory pool, its work queues
//! and its event timeline. All `_async` methods enqueue and return; the only
//! blocking join points are [`DeviceBackend::synchronize`] and
//! [`DeviceBackend::synchronize_stream`].

use crate::error::Result;
use crate::memory::{
    AllocOutcome, DevicePtr, EventHandle, HostPtr, MemInfo, MemcpyKind, StreamHandle,
};

/// Backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Simulated device executing queue logs on the host.
    Sim,
    /// NVIDIA CUDA.
    Cuda,
}

impl Backend {
    /// Configuration name of this backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Backend::Sim => "sim",
            Backend::Cuda => "cuda",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device memory, queue and event primitives.
pub trait DeviceBackend: Send + Sync {
    /// Which backend this is.
    fn backend(&self) -> Backend;

    /// Free and total device memory at call time.
    fn mem_info(&self) -> Result<MemInfo>;

    /// Stream-ordered pooled allocation.
    fn alloc_async(&self, bytes: u64, stream: StreamHandle) -> Result<AllocOutcome>;

    /// Stream-ordered release back to the pool.
    fn free_async(&self, ptr: DevicePtr, stream: StreamHandle) -> Result<()>;

    /// Synchronous page-locked host allocation.
    fn alloc_pinned_host(&self, bytes: u64) -> Result<HostPtr>;

    /// Synchronous release of page-locked host memory.
    fn free_pinned_host(&self, ptr: HostPtr) -> Result<()>;

    /// Release cached free blocks of the default pool down to `min_bytes_to_keep`.
    fn trim_pool(&self, min_bytes_to_keep: u64) -> Result<()>;

    /// Enqueue a byte fill.
    fn memset_async(
        &self,
        dst: DevicePtr,
        bytes: u64,
        value: u8,
        stream: StreamHandle,
    ) -> Result<()>;

    /// Enqueue a copy. Addresses are interpreted according to `kind`.
    fn memcpy_async(
        &self,
        src: u64,
        dst: u64,
        bytes: u64,
        kind: MemcpyKind,
        stream: StreamHandle,
    ) -> Result<()>;

    /// Block until every queue on the device has drained.
    fn synchronize(&self) -> Result<()>;

    /// Create an additional work queue.
    fn create_stream(&self) -> Result<StreamHandle>;

    /// Destroy a work queue created with [`DeviceBackend::create_stream`].
    fn destroy_stream(&self, stream: StreamHandle) -> Result<()>;

    /// Block until one queue has drained.
    fn synchronize_stream(&self, stream: StreamHandle) -> Result<()>;

    /// Create a timing event.
    fn create_event(&self) -> Result<EventHandle>;

    /// Destroy a timing event.
    fn destroy_event(&self, event: EventHandle) -> Result<()>;

    /// Place `event` at the current tail of `stream`.
    fn record_event(&self, event: EventHandle, stream: StreamHandle) -> Result<()>;

    /// Milliseconds between two recorded, completed events.
    fn elapsed_time(&self, start: EventHandle, end: EventHandle) -> Result<f32>;

    /// Copy bytes into pinned host memory.
    fn write_host(&self, dst: HostPtr, data: &[u8]) -> Result<()>;

    /// Copy bytes out of pinned host memory.
    fn read_host(&self, src: HostPtr, out: &mut [u8]) -> Result<()>;

    /// Construct a pseudo-random generator bound to this device.
    fn create_generator(&self, seed: u64) -> Result<Box<dyn RandomGenerator>>;
}

/// Device-side pseudo-random generator.
///
/// Generators run on their own queue. Normal sampling produces values in
/// pairs, so `generate_normal` rejects odd counts; callers that need an odd
/// count round up themselves.
pub trait RandomGenerator: Send + Sync {
    /// Fill `count` f32 values uniformly distributed in `[0, 1)`.
    fn generate_uniform(&self, dst: DevicePtr, count: u64) -> Result<()>;

    /// Fill `count` f32 values from Normal(mean, stddev²). `count` must be even.
    fn generate_normal(&self, dst: DevicePtr, count: u64, mean: f32, stddev: f32) -> Result<()>;

    /// Queue the generator enqueues onto.
    fn stream(&self) -> StreamHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!(Backend::Sim.as_str(), "sim");
        assert_eq!(Backend::Cuda.to_string(), "cuda");
    }
}
