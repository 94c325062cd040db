//! CUDA device backend.
//!
//! Streams, events and pinned buffers are owned by handle-indexed tables so
//! the 64-bit handles that cross the flat ABI are never reinterpreted as
//! driver objects without a lookup. Device pointers are the exception: a
//! stream-ordered allocation is already a plain `CUdeviceptr`.

use std::collections::{BTreeMap, HashMap};
use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;

use cudarc::driver::result as cuda_result;
use cudarc::driver::sys as cuda_sys;
use cudarc::driver::{CudaContext, DriverError};
use parking_lot::Mutex;
use tracing::{debug, info};

use accelrt_core::backend::{Backend, DeviceBackend, RandomGenerator};
use accelrt_core::error::{AccelError, Result};
use accelrt_core::memory::{
    AllocOutcome, DevicePtr, EventHandle, HostPtr, MemInfo, MemcpyKind, StreamHandle,
};

use crate::random::CurandGenerator;

/// Driver stream owned by the stream table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawStream(pub(crate) cuda_sys::CUstream);

// SAFETY: CUstream handles are process-wide driver objects usable from any
// thread once the owning context is bound.
unsafe impl Send for RawStream {}
unsafe impl Sync for RawStream {}

#[derive(Debug, Clone, Copy)]
struct RawEvent(cuda_sys::CUevent);

// SAFETY: as for RawStream.
unsafe impl Send for RawEvent {}

#[derive(Debug, Default)]
struct Tables {
    streams: HashMap<u64, RawStream>,
    events: HashMap<u64, RawEvent>,
    pinned: BTreeMap<u64, usize>,
    next_stream: u64,
    next_event: u64,
}

impl Tables {
    fn stream(&self, handle: StreamHandle) -> Result<cuda_sys::CUstream> {
        if handle.is_default() {
            return Ok(ptr::null_mut());
        }
        self.streams
            .get(&handle.as_raw())
            .map(|s| s.0)
            .ok_or_else(|| AccelError::Stream(format!("unknown stream {:#x}", handle.as_raw())))
    }

    fn event(&self, handle: EventHandle) -> Result<cuda_sys::CUevent> {
        self.events
            .get(&handle.as_raw())
            .map(|e| e.0)
            .ok_or_else(|| AccelError::Event(format!("unknown event {:#x}", handle.as_raw())))
    }

    fn pinned_contains(&self, addr: u64, len: usize) -> bool {
        match self.pinned.range(..=addr).next_back() {
            Some((&base, &size)) => (addr - base)
                .checked_add(len as u64)
                .is_some_and(|end| end <= size as u64),
            None => false,
        }
    }
}

fn driver_msg(what: &str, e: DriverError) -> String {
    format!("{} failed: {:?}", what, e)
}

fn check(result: cuda_sys::CUresult, what: &str) -> std::result::Result<(), String> {
    if result == cuda_sys::CUresult::CUDA_SUCCESS {
        Ok(())
    } else {
        Err(format!("{} failed: {:?}", what, result))
    }
}

/// One CUDA device and its primary context.
pub struct CudaDevice {
    ctx: Arc<CudaContext>,
    ordinal: usize,
    name: String,
    tables: Mutex<Tables>,
}

impl CudaDevice {
    /// Open device `ordinal`.
    pub fn new(ordinal: usize) -> Result<Self> {
        let ctx = CudaContext::new(ordinal).map_err(|e| {
            AccelError::BackendUnavailable(format!(
                "Failed to create CUDA device {}: {}",
                ordinal, e
            ))
        })?;

        let name = ctx.name().map_err(|e| {
            AccelError::DeviceQuery(format!("Failed to get device name: {}", e))
        })?;

        info!(ordinal, name = %name, "CUDA device opened");

        Ok(Self {
            ctx,
            ordinal,
            name,
            tables: Mutex::new(Tables {
                next_stream: 1,
                next_event: 1,
                ..Tables::default()
            }),
        })
    }

    /// Device ordinal.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying cudarc context.
    pub fn context(&self) -> &Arc<CudaContext> {
        &self.ctx
    }

    fn bind<F>(&self, wrap: F) -> Result<()>
    where
        F: FnOnce(String) -> AccelError,
    {
        self.ctx
            .bind_to_thread()
            .map_err(|e| wrap(driver_msg("binding context", e)))
    }

    pub(crate) fn raw_stream(&self, stream: StreamHandle) -> Result<cuda_sys::CUstream> {
        self.tables.lock().stream(stream)
    }
}

impl DeviceBackend for CudaDevice {
    fn backend(&self) -> Backend {
        Backend::Cuda
    }

    fn mem_info(&self) -> Result<MemInfo> {
        self.bind(AccelError::DeviceQuery)?;
        let (free, total) = cuda_result::mem_get_info()
            .map_err(|e| AccelError::DeviceQuery(driver_msg("cuMemGetInfo", e)))?;
        Ok(MemInfo {
            free_bytes: free as u64,
            total_bytes: total as u64,
        })
    }

    fn alloc_async(&self, bytes: u64, stream: StreamHandle) -> Result<AllocOutcome> {
        let alloc_err = |reason: String| AccelError::Allocation {
            size: bytes,
            reason,
        };
        self.bind(alloc_err)?;
        let raw = self.raw_stream(stream)?;

        // SAFETY: the context is bound and `raw` is a live stream of it.
        match unsafe { cuda_result::malloc_async(raw, bytes as usize) } {
            Ok(dptr) => Ok(AllocOutcome::Allocated(DevicePtr::from_raw(dptr))),
            Err(e) if e.0 == cuda_sys::CUresult::CUDA_ERROR_OUT_OF_MEMORY => {
                debug!(bytes, "cuMemAllocAsync out of memory");
                Ok(AllocOutcome::OutOfMemory { requested: bytes })
            }
            Err(e) => Err(alloc_err(driver_msg("cuMemAllocAsync", e))),
        }
    }

    fn free_async(&self, ptr: DevicePtr, stream: StreamHandle) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }
        let free_err = |reason: String| AccelError::Free {
            ptr: ptr.as_raw(),
            reason,
        };
        self.bind(free_err)?;
        let raw = self.raw_stream(stream)?;

        // SAFETY: the driver validates the pointer; ownership ends here.
        unsafe { cuda_result::free_async(ptr.as_raw(), raw) }
            .map_err(|e| free_err(driver_msg("cuMemFreeAsync", e)))
    }

    fn alloc_pinned_host(&self, bytes: u64) -> Result<HostPtr> {
        let alloc_err = |reason: String| AccelError::Allocation {
            size: bytes,
            reason,
        };
        self.bind(alloc_err)?;

        // SAFETY: the context is bound; the buffer is tracked until freed.
        let host = unsafe { cuda_result::malloc_host(bytes as usize, 0) }
            .map_err(|e| alloc_err(driver_msg("cuMemHostAlloc", e)))?;

        let addr = host as u64;
        self.tables.lock().pinned.insert(addr, bytes as usize);
        Ok(HostPtr::from_raw(addr))
    }

    fn free_pinned_host(&self, ptr: HostPtr) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }
        let free_err = |reason: String| AccelError::Free {
            ptr: ptr.as_raw(),
            reason,
        };
        self.bind(free_err)?;

        if self.tables.lock().pinned.remove(&ptr.as_raw()).is_none() {
            return Err(free_err(
                "not the base address of a pinned host allocation".to_string(),
            ));
        }

        // SAFETY: the address came from cuMemHostAlloc and was just untracked.
        unsafe { cuda_result::free_host(ptr.as_raw() as *mut c_void) }
            .map_err(|e| free_err(driver_msg("cuMemFreeHost", e)))
    }

    fn trim_pool(&self, min_bytes_to_keep: u64) -> Result<()> {
        self.bind(AccelError::Pool)?;

        let mut pool: cuda_sys::CUmemoryPool = ptr::null_mut();
        // SAFETY: out-pointer is valid; the device belongs to the bound context.
        unsafe {
            check(
                cuda_sys::cuDeviceGetDefaultMemPool(&mut pool, self.ctx.cu_device()),
                "cuDeviceGetDefaultMemPool",
            )
            .map_err(AccelError::Pool)?;
            check(
                cuda_sys::cuMemPoolTrimTo(pool, min_bytes_to_keep as usize),
                "cuMemPoolTrimTo",
            )
            .map_err(AccelError::Pool)?;
        }

        debug!(min_bytes_to_keep, "Trimmed default memory pool");
        Ok(())
    }

    fn memset_async(
        &self,
        dst: DevicePtr,
        bytes: u64,
        value: u8,
        stream: StreamHandle,
    ) -> Result<()> {
        self.bind(AccelError::Transfer)?;
        let raw = self.raw_stream(stream)?;

        // SAFETY: the driver validates the destination range.
        unsafe { cuda_result::memset_d8_async(dst.as_raw(), value, bytes as usize, raw) }
            .map_err(|e| AccelError::Transfer(driver_msg("cuMemsetD8Async", e)))
    }

    fn memcpy_async(
        &self,
        src: u64,
        dst: u64,
        bytes: u64,
        kind: MemcpyKind,
        stream: StreamHandle,
    ) -> Result<()> {
        self.bind(AccelError::Transfer)?;
        let raw = self.raw_stream(stream)?;
        let len = bytes as usize;

        // SAFETY: the caller declares the memory kinds; the driver validates
        // device ranges and reports mismatches it can detect.
        let result = unsafe {
            match kind {
                MemcpyKind::HostToHost => cuda_sys::cuMemcpyAsync(dst, src, len, raw),
                MemcpyKind::HostToDevice => {
                    cuda_sys::cuMemcpyHtoDAsync_v2(dst, src as *const c_void, len, raw)
                }
                MemcpyKind::DeviceToHost => {
                    cuda_sys::cuMemcpyDtoHAsync_v2(dst as *mut c_void, src, len, raw)
                }
                MemcpyKind::DeviceToDevice => cuda_sys::cuMemcpyDtoDAsync_v2(dst, src, len, raw),
            }
        };
        check(result, kind.label()).map_err(AccelError::Transfer)
    }

    fn synchronize(&self) -> Result<()> {
        self.bind(AccelError::Stream)?;
        cuda_result::ctx::synchronize()
            .map_err(|e| AccelError::Stream(driver_msg("cuCtxSynchronize", e)))
    }

    fn create_stream(&self) -> Result<StreamHandle> {
        self.bind(AccelError::Stream)?;
        let raw = cuda_result::stream::create(cuda_result::stream::StreamKind::NonBlocking)
            .map_err(|e| AccelError::Stream(driver_msg("cuStreamCreate", e)))?;

        let mut tables = self.tables.lock();
        let id = tables.next_stream;
        tables.next_stream += 1;
        tables.streams.insert(id, RawStream(raw));
        Ok(StreamHandle::from_raw(id))
    }

    fn destroy_stream(&self, stream: StreamHandle) -> Result<()> {
        if stream.is_default() {
            return Err(AccelError::Stream(
                "the default stream cannot be destroyed".to_string(),
            ));
        }
        self.bind(AccelError::Stream)?;
        let raw = self
            .tables
            .lock()
            .streams
            .remove(&stream.as_raw())
            .ok_or_else(|| AccelError::Stream(format!("unknown stream {:#x}", stream.as_raw())))?;

        // SAFETY: removed from the table, so no other call can reach it.
        unsafe { cuda_result::stream::destroy(raw.0) }
            .map_err(|e| AccelError::Stream(driver_msg("cuStreamDestroy", e)))
    }

    fn synchronize_stream(&self, stream: StreamHandle) -> Result<()> {
        self.bind(AccelError::Stream)?;
        let raw = self.raw_stream(stream)?;
        // SAFETY: `raw` is a live stream of the bound context.
        unsafe { cuda_result::stream::synchronize(raw) }
            .map_err(|e| AccelError::Stream(driver_msg("cuStreamSynchronize", e)))
    }

    fn create_event(&self) -> Result<EventHandle> {
        self.bind(AccelError::Event)?;
        let raw = cuda_result::event::create(cuda_sys::CUevent_flags::CU_EVENT_DEFAULT)
            .map_err(|e| AccelError::Event(driver_msg("cuEventCreate", e)))?;

        let mut tables = self.tables.lock();
        let id = tables.next_event;
        tables.next_event += 1;
        tables.events.insert(id, RawEvent(raw));
        Ok(EventHandle::from_raw(id))
    }

    fn destroy_event(&self, event: EventHandle) -> Result<()> {
        self.bind(AccelError::Event)?;
        let raw = self
            .tables
            .lock()
            .events
            .remove(&event.as_raw())
            .ok_or_else(|| AccelError::Event(format!("unknown event {:#x}", event.as_raw())))?;

        // SAFETY: removed from the table, so no other call can reach it.
        unsafe { cuda_result::event::destroy(raw.0) }
            .map_err(|e| AccelError::Event(driver_msg("cuEventDestroy", e)))
    }

    fn record_event(&self, event: EventHandle, stream: StreamHandle) -> Result<()> {
        self.bind(AccelError::Event)?;
        let (raw_event, raw_stream) = {
            let tables = self.tables.lock();
            (tables.event(event)?, tables.stream(stream)?)
        };

        // SAFETY: both handles are live objects of the bound context.
        unsafe { cuda_result::event::record(raw_event, raw_stream) }
            .map_err(|e| AccelError::Event(driver_msg("cuEventRecord", e)))
    }

    fn elapsed_time(&self, start: EventHandle, end: EventHandle) -> Result<f32> {
        self.bind(AccelError::Event)?;
        let (raw_start, raw_end) = {
            let tables = self.tables.lock();
            (tables.event(start)?, tables.event(end)?)
        };

        // SAFETY: both events are live; the driver reports unrecorded or
        // incomplete events as errors.
        unsafe { cuda_result::event::elapsed(raw_start, raw_end) }
            .map_err(|e| AccelError::Event(driver_msg("cuEventElapsedTime", e)))
    }

    fn write_host(&self, dst: HostPtr, data: &[u8]) -> Result<()> {
        if !self.tables.lock().pinned_contains(dst.as_raw(), data.len()) {
            return Err(AccelError::Transfer(format!(
                "host write of {} bytes at {:#x} is outside any pinned allocation",
                data.len(),
                dst.as_raw()
            )));
        }
        // SAFETY: the range lies inside a live pinned allocation.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), dst.as_raw() as *mut u8, data.len());
        }
        Ok(())
    }

    fn read_host(&self, src: HostPtr, out: &mut [u8]) -> Result<()> {
        if !self.tables.lock().pinned_contains(src.as_raw(), out.len()) {
            return Err(AccelError::Transfer(format!(
                "host read of {} bytes at {:#x} is outside any pinned allocation",
                out.len(),
                src.as_raw()
            )));
        }
        // SAFETY: the range lies inside a live pinned allocation.
        unsafe {
            ptr::copy_nonoverlapping(src.as_raw() as *const u8, out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    fn create_generator(&self, seed: u64) -> Result<Box<dyn RandomGenerator>> {
        let stream = self
            .create_stream()
            .map_err(|e| AccelError::RandomGen(e.to_string()))?;
        let raw = self.raw_stream(stream)?;
        let generator = CurandGenerator::new(Arc::clone(&self.ctx), stream, RawStream(raw), seed)?;
        Ok(Box::new(generator))
    }
}

impl Drop for CudaDevice {
    fn drop(&mut self) {
        if self.ctx.bind_to_thread().is_err() {
            return;
        }
        let tables = std::mem::take(&mut *self.tables.lock());
        // SAFETY: every handle below was created by this device and is no
        // longer reachable through the tables.
        unsafe {
            for (_, event) in tables.events {
                let _ = cuda_result::event::destroy(event.0);
            }
            for (_, stream) in tables.streams {
                let _ = cuda_result::stream::destroy(stream.0);
            }
            for (addr, _) in tables.pinned {
                let _ = cuda_result::free_host(addr as *mut c_void);
            }
        }
    }
}
