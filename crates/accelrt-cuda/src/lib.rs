//! CUDA Backend for accelrt
//!
//! Implements [`DeviceBackend`](accelrt_core::DeviceBackend) on NVIDIA GPUs
//! through cudarc: stream-ordered allocation from the device's default
//! memory pool, async copies and fills, driver events and cuRAND fills.
//!
//! # Requirements
//!
//! - NVIDIA GPU with stream-ordered allocator support (CUDA 11.2+)
//! - The `cuda` feature enabled
//!
//! Without the feature, [`CudaDevice::new`] fails with
//! `BackendUnavailable` and [`cuda_device_count`] returns 0.

#![warn(missing_docs)]

#[cfg(feature = "cuda")]
mod device;
#[cfg(feature = "cuda")]
mod random;

#[cfg(feature = "cuda")]
pub use device::CudaDevice;
#[cfg(feature = "cuda")]
pub use random::CurandGenerator;

#[cfg(not(feature = "cuda"))]
pub use stub::CudaDevice;

// Placeholder implementation when CUDA is not available
#[cfg(not(feature = "cuda"))]
mod stub {
    use accelrt_core::backend::{Backend, DeviceBackend, RandomGenerator};
    use accelrt_core::error::{AccelError, Result};
    use accelrt_core::memory::{
        AllocOutcome, DevicePtr, EventHandle, HostPtr, MemInfo, MemcpyKind, StreamHandle,
    };

    fn unavailable<T>() -> Result<T> {
        Err(AccelError::BackendUnavailable(
            "CUDA feature not enabled".to_string(),
        ))
    }

    /// Stub CUDA device when the CUDA feature is disabled.
    pub struct CudaDevice {
        _private: (),
    }

    impl CudaDevice {
        /// Always fails when CUDA is not available.
        pub fn new(_ordinal: usize) -> Result<Self> {
            unavailable()
        }

        /// Device ordinal.
        pub fn ordinal(&self) -> usize {
            0
        }

        /// Device name.
        pub fn name(&self) -> &str {
            "unavailable"
        }
    }

    impl DeviceBackend for CudaDevice {
        fn backend(&self) -> Backend {
            Backend::Cuda
        }

        fn mem_info(&self) -> Result<MemInfo> {
            unavailable()
        }

        fn alloc_async(&self, _bytes: u64, _stream: StreamHandle) -> Result<AllocOutcome> {
            unavailable()
        }

        fn free_async(&self, _ptr: DevicePtr, _stream: StreamHandle) -> Result<()> {
            unavailable()
        }

        fn alloc_pinned_host(&self, _bytes: u64) -> Result<HostPtr> {
            unavailable()
        }

        fn free_pinned_host(&self, _ptr: HostPtr) -> Result<()> {
            unavailable()
        }

        fn trim_pool(&self, _min_bytes_to_keep: u64) -> Result<()> {
            unavailable()
        }

        fn memset_async(
            &self,
            _dst: DevicePtr,
            _bytes: u64,
            _value: u8,
            _stream: StreamHandle,
        ) -> Result<()> {
            unavailable()
        }

        fn memcpy_async(
            &self,
            _src: u64,
            _dst: u64,
            _bytes: u64,
            _kind: MemcpyKind,
            _stream: StreamHandle,
        ) -> Result<()> {
            unavailable()
        }

        fn synchronize(&self) -> Result<()> {
            unavailable()
        }

        fn create_stream(&self) -> Result<StreamHandle> {
            unavailable()
        }

        fn destroy_stream(&self, _stream: StreamHandle) -> Result<()> {
            unavailable()
        }

        fn synchronize_stream(&self, _stream: StreamHandle) -> Result<()> {
            unavailable()
        }

        fn create_event(&self) -> Result<EventHandle> {
            unavailable()
        }

        fn destroy_event(&self, _event: EventHandle) -> Result<()> {
            unavailable()
        }

        fn record_event(&self, _event: EventHandle, _stream: StreamHandle) -> Result<()> {
            unavailable()
        }

        fn elapsed_time(&self, _start: EventHandle, _end: EventHandle) -> Result<f32> {
            unavailable()
        }

        fn write_host(&self, _dst: HostPtr, _data: &[u8]) -> Result<()> {
            unavailable()
        }

        fn read_host(&self, _src: HostPtr, _out: &mut [u8]) -> Result<()> {
            unavailable()
        }

        fn create_generator(&self, _seed: u64) -> Result<Box<dyn RandomGenerator>> {
            unavailable()
        }
    }
}

/// Get CUDA device count.
///
/// Returns 0 if CUDA is not available or libraries are not installed.
pub fn cuda_device_count() -> usize {
    #[cfg(feature = "cuda")]
    {
        // cudarc panics if CUDA libraries are not found, so we catch that
        std::panic::catch_unwind(|| {
            cudarc::driver::CudaContext::device_count().unwrap_or(0) as usize
        })
        .unwrap_or(0)
    }
    #[cfg(not(feature = "cuda"))]
    {
        0
    }
}

/// Whether a CUDA device can be opened.
pub fn is_cuda_available() -> bool {
    cuda_device_count() > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(feature = "cuda"))]
    fn test_stub_is_unavailable() {
        assert_eq!(cuda_device_count(), 0);
        assert!(!is_cuda_available());
        let err = CudaDevice::new(0).err().unwrap();
        assert_eq!(err.kind(), accelrt_core::ErrorKind::BackendUnavailable);
    }

    #[test]
    #[cfg(feature = "cuda")]
    #[ignore] // Requires CUDA hardware
    fn test_device_count() {
        assert!(cuda_device_count() > 0);
        assert!(is_cuda_available());
    }
}
