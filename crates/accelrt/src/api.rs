//! Free functions over the process-wide runtime.
//!
//! Each call resolves [`global`](crate::global) and forwards to the matching
//! [`Runtime`](crate::Runtime) method on the default stream.

use accelrt_core::error::Result;
use accelrt_core::memory::{
    AllocOutcome, DevicePtr, EventHandle, HostPtr, MemInfo, MemcpyKind, StreamHandle,
};

use crate::runtime::global;

/// Free and total memory of the active device.
pub fn mem_info() -> Result<MemInfo> {
    global()?.mem_info()
}

/// Stream-ordered pooled allocation. Out-of-memory is not an error.
pub fn alloc_async(bytes: u64) -> Result<AllocOutcome> {
    global()?.alloc_async(bytes)
}

/// Page-locked host allocation.
pub fn alloc_pinned_host(bytes: u64) -> Result<HostPtr> {
    global()?.alloc_pinned_host(bytes)
}

/// Stream-ordered release back to the pool.
pub fn free_async(ptr: DevicePtr) -> Result<()> {
    global()?.free_async(ptr)
}

/// Release page-locked host memory.
pub fn free_pinned_host(ptr: HostPtr) -> Result<()> {
    global()?.free_pinned_host(ptr)
}

/// Release cached pool memory down to `min_bytes_to_keep`.
pub fn trim_pool(min_bytes_to_keep: u64) -> Result<()> {
    global()?.trim_pool(min_bytes_to_keep)
}

/// Enqueue a byte fill.
pub fn memset_async(dst: DevicePtr, bytes: u64, value: u8) -> Result<()> {
    global()?.memset_async(dst, bytes, value)
}

/// Enqueue a copy.
pub fn memcpy_async(src: u64, dst: u64, bytes: u64, kind: MemcpyKind) -> Result<()> {
    global()?.memcpy_async(src, dst, bytes, kind)
}

/// Block until all device work has completed.
pub fn synchronize_device() -> Result<()> {
    global()?.synchronize_device()
}

/// Fill `count` f32 values uniformly in `[0, 1)`.
pub fn generate_uniform(dst: DevicePtr, count: u64) -> Result<()> {
    global()?.generate_uniform(dst, count)
}

/// Fill `count` f32 normal samples; odd counts write one extra value.
pub fn generate_normal(dst: DevicePtr, count: u64, mean: f32, stddev: f32) -> Result<()> {
    global()?.generate_normal(dst, count, mean, stddev)
}

/// Create a timing event.
pub fn create_event() -> Result<EventHandle> {
    global()?.create_event()
}

/// Destroy a timing event.
pub fn destroy_event(event: EventHandle) -> Result<()> {
    global()?.destroy_event(event)
}

/// Record `event` on `stream`.
pub fn record_event(event: EventHandle, stream: StreamHandle) -> Result<()> {
    global()?.record_event(event, stream)
}

/// Milliseconds between two completed events.
pub fn elapsed_time(start: EventHandle, end: EventHandle) -> Result<f32> {
    global()?.elapsed_time(start, end)
}
