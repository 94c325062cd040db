//! Simulated device.
//!
//! All device state sits behind one lock. `_async` calls validate their
//! arguments against the state at enqueue time and append to a stream log;
//! joins execute logs in issue order, advancing a simulated clock by a fixed
//! per-operation overhead plus payload size over the configured rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use accelrt_core::backend::{Backend, DeviceBackend, RandomGenerator};
use accelrt_core::config::SimConfig;
use accelrt_core::error::{AccelError, Result};
use accelrt_core::memory::{
    AllocOutcome, DevicePtr, EventHandle, HostPtr, MemInfo, MemcpyKind, StreamHandle,
};

use crate::event::{EventState, EventTable};
use crate::generator::SimGenerator;
use crate::host::PinnedHeap;
use crate::pool::{DevicePool, PoolStats};
use crate::queue::{Op, StreamTable};

/// Fixed cost of every executed operation except event markers.
const OP_OVERHEAD_MS: f64 = 0.001;

/// Device state guarded by [`Shared::state`].
#[derive(Debug)]
pub(crate) struct SimState {
    pub(crate) pool: DevicePool,
    pub(crate) host: PinnedHeap,
    pub(crate) streams: StreamTable,
    pub(crate) events: EventTable,
    clock_ms: f64,
    bytes_per_ms: u64,
}

impl SimState {
    fn new(config: &SimConfig) -> Self {
        Self {
            pool: DevicePool::new(config.total_memory_bytes, config.allocation_granularity),
            host: PinnedHeap::new(config.pinned_limit_bytes, config.allocation_granularity),
            streams: StreamTable::new(),
            events: EventTable::new(),
            clock_ms: 0.0,
            bytes_per_ms: config.bytes_per_ms.max(1),
        }
    }

    /// Execute everything queued on `stream`.
    pub(crate) fn run_stream(&mut self, stream: StreamHandle) -> Result<usize> {
        let ops = self.streams.get_mut(stream)?.drain();
        let count = ops.len();
        for op in ops {
            self.execute(stream, op);
        }
        Ok(count)
    }

    /// Execute every stream, default first.
    pub(crate) fn run_all(&mut self) -> usize {
        let mut executed = 0;
        for stream in self.streams.handles() {
            executed += self.run_stream(stream).unwrap_or(0);
        }
        executed
    }

    fn execute(&mut self, stream: StreamHandle, op: Op) {
        if !matches!(op, Op::Record { .. }) {
            self.clock_ms += OP_OVERHEAD_MS + op.payload_bytes() as f64 / self.bytes_per_ms as f64;
        }

        let applied = match &op {
            Op::Free { ptr } => self.pool.complete_free(*ptr),
            Op::Memset { dst, bytes, value } => match self.pool.bytes_mut(*dst, *bytes) {
                Some(span) => {
                    span.fill(*value);
                    true
                }
                None => false,
            },
            Op::Memcpy {
                src,
                dst,
                bytes,
                kind,
            } => match self.read_span(*src, *bytes, kind.src_is_device()) {
                Some(data) => self.write_span(*dst, &data, kind.dst_is_device()),
                None => false,
            },
            Op::Write { dst, data } => self.write_span(*dst, data, true),
            Op::Record { event, generation } => {
                self.events.complete(*event, *generation, self.clock_ms);
                true
            }
        };

        if !applied {
            warn!(
                stream = stream.as_raw(),
                op = op.name(),
                "Queued operation touched memory released before it ran"
            );
        }
    }

    fn read_span(&self, addr: u64, len: u64, device: bool) -> Option<Vec<u8>> {
        let span = if device {
            self.pool.bytes(addr, len)
        } else {
            self.host.bytes(addr, len)
        };
        span.map(<[u8]>::to_vec)
    }

    fn write_span(&mut self, addr: u64, data: &[u8], device: bool) -> bool {
        let len = data.len() as u64;
        let span = if device {
            self.pool.bytes_mut(addr, len)
        } else {
            self.host.bytes_mut(addr, len)
        };
        match span {
            Some(span) => {
                span.copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    fn check_span(&self, addr: u64, len: u64, device: bool) -> bool {
        if device {
            self.pool.is_live_range(addr, len)
        } else {
            self.host.contains(addr, len)
        }
    }

    /// Append `op` to `stream`.
    pub(crate) fn enqueue(&mut self, stream: StreamHandle, op: Op) -> Result<()> {
        debug!(stream = stream.as_raw(), op = op.name(), bytes = op.payload_bytes(), "Enqueued");
        self.streams.get_mut(stream)?.push(op);
        Ok(())
    }
}

pub(crate) struct Shared {
    pub(crate) config: SimConfig,
    pub(crate) state: Mutex<SimState>,
    generators_created: AtomicU64,
}

/// Simulated accelerator.
///
/// Cloning yields another handle to the same device.
#[derive(Clone)]
pub struct SimDevice {
    shared: Arc<Shared>,
}

impl SimDevice {
    /// Device with the given parameters.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        info!(
            total_bytes = config.total_memory_bytes,
            granularity = config.allocation_granularity,
            pinned_limit = config.pinned_limit_bytes,
            "Simulated device created"
        );
        let state = SimState::new(&config);
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
                generators_created: AtomicU64::new(0),
            }),
        }
    }

    /// Device with default parameters.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(SimConfig::default())
    }

    /// Device parameters.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.shared.config
    }

    /// Pool counters.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.shared.state.lock().pool.stats()
    }

    /// Bytes of pinned host memory currently locked.
    #[must_use]
    pub fn pinned_bytes(&self) -> u64 {
        self.shared.state.lock().host.used_bytes()
    }

    /// Operations queued on `stream` that have not executed.
    pub fn pending_ops(&self, stream: StreamHandle) -> Result<usize> {
        Ok(self.shared.state.lock().streams.get(stream)?.pending())
    }

    /// Operations queued on all streams that have not executed.
    #[must_use]
    pub fn total_pending_ops(&self) -> usize {
        self.shared.state.lock().streams.total_pending()
    }

    /// Current simulated device time.
    #[must_use]
    pub fn clock_ms(&self) -> f64 {
        self.shared.state.lock().clock_ms
    }

    /// Recording state of `event`.
    pub fn event_state(&self, event: EventHandle) -> Result<EventState> {
        self.shared.state.lock().events.state(event)
    }

    /// Number of random generators constructed on this device.
    #[must_use]
    pub fn generators_created(&self) -> u64 {
        self.shared.generators_created.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SimDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDevice")
            .field("config", &self.shared.config)
            .field("pool", &self.pool_stats())
            .finish()
    }
}

impl DeviceBackend for SimDevice {
    fn backend(&self) -> Backend {
        Backend::Sim
    }

    fn mem_info(&self) -> Result<MemInfo> {
        let state = self.shared.state.lock();
        Ok(MemInfo {
            free_bytes: state.pool.free_bytes(),
            total_bytes: state.pool.total_bytes(),
        })
    }

    fn alloc_async(&self, bytes: u64, stream: StreamHandle) -> Result<AllocOutcome> {
        let mut state = self.shared.state.lock();
        if !state.streams.contains(stream) {
            return Err(AccelError::Stream(format!(
                "unknown stream {:#x}",
                stream.as_raw()
            )));
        }

        match state.pool.allocate(bytes) {
            Some(ptr) => Ok(AllocOutcome::Allocated(ptr)),
            None => {
                debug!(bytes, free = state.pool.free_bytes(), "Device allocation out of memory");
                Ok(AllocOutcome::OutOfMemory { requested: bytes })
            }
        }
    }

    fn free_async(&self, ptr: DevicePtr, stream: StreamHandle) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }
        let mut state = self.shared.state.lock();
        // Check the stream first so a rejected call leaves the block live.
        state.streams.get(stream)?;
        state.pool.begin_free(ptr)?;
        state.enqueue(stream, Op::Free { ptr })
    }

    fn alloc_pinned_host(&self, bytes: u64) -> Result<HostPtr> {
        self.shared.state.lock().host.allocate(bytes)
    }

    fn free_pinned_host(&self, ptr: HostPtr) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }
        let mut state = self.shared.state.lock();
        // Releasing page-locked memory waits for the device.
        state.run_all();
        state.host.free(ptr).map(|_| ())
    }

    fn trim_pool(&self, min_bytes_to_keep: u64) -> Result<()> {
        let released = self.shared.state.lock().pool.trim(min_bytes_to_keep);
        debug!(min_bytes_to_keep, released, "Trimmed pool");
        Ok(())
    }

    fn memset_async(
        &self,
        dst: DevicePtr,
        bytes: u64,
        value: u8,
        stream: StreamHandle,
    ) -> Result<()> {
        let mut state = self.shared.state.lock();
        if !state.pool.is_live_range(dst.as_raw(), bytes) {
            return Err(AccelError::Transfer(format!(
                "memset of {} bytes at {:#x} is outside any live device allocation",
                bytes,
                dst.as_raw()
            )));
        }
        state.enqueue(
            stream,
            Op::Memset {
                dst: dst.as_raw(),
                bytes,
                value,
            },
        )
    }

    fn memcpy_async(
        &self,
        src: u64,
        dst: u64,
        bytes: u64,
        kind: MemcpyKind,
        stream: StreamHandle,
    ) -> Result<()> {
        let mut state = self.shared.state.lock();
        if !state.check_span(src, bytes, kind.src_is_device()) {
            return Err(AccelError::Transfer(format!(
                "{} copy source {:#x}+{} is not a valid {} range",
                kind.label(),
                src,
                bytes,
                if kind.src_is_device() { "device" } else { "pinned host" }
            )));
        }
        if !state.check_span(dst, bytes, kind.dst_is_device()) {
            return Err(AccelError::Transfer(format!(
                "{} copy destination {:#x}+{} is not a valid {} range",
                kind.label(),
                dst,
                bytes,
                if kind.dst_is_device() { "device" } else { "pinned host" }
            )));
        }
        state.enqueue(
            stream,
            Op::Memcpy {
                src,
                dst,
                bytes,
                kind,
            },
        )
    }

    fn synchronize(&self) -> Result<()> {
        let executed = self.shared.state.lock().run_all();
        debug!(executed, "Device synchronized");
        Ok(())
    }

    fn create_stream(&self) -> Result<StreamHandle> {
        let stream = self.shared.state.lock().streams.create();
        debug!(stream = stream.as_raw(), "Stream created");
        Ok(stream)
    }

    fn destroy_stream(&self, stream: StreamHandle) -> Result<()> {
        let mut state = self.shared.state.lock();
        if stream.is_default() {
            return Err(AccelError::Stream(
                "the default stream cannot be destroyed".to_string(),
            ));
        }
        // Work already queued still completes.
        state.run_stream(stream)?;
        state.streams.remove(stream).map(|_| ())
    }

    fn synchronize_stream(&self, stream: StreamHandle) -> Result<()> {
        let executed = self.shared.state.lock().run_stream(stream)?;
        debug!(stream = stream.as_raw(), executed, "Stream synchronized");
        Ok(())
    }

    fn create_event(&self) -> Result<EventHandle> {
        Ok(self.shared.state.lock().events.create())
    }

    fn destroy_event(&self, event: EventHandle) -> Result<()> {
        self.shared.state.lock().events.destroy(event)
    }

    fn record_event(&self, event: EventHandle, stream: StreamHandle) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.streams.get(stream)?;
        let generation = state.events.begin_record(event, stream)?;
        state.enqueue(stream, Op::Record { event, generation })
    }

    fn elapsed_time(&self, start: EventHandle, end: EventHandle) -> Result<f32> {
        self.shared.state.lock().events.elapsed_ms(start, end)
    }

    fn write_host(&self, dst: HostPtr, data: &[u8]) -> Result<()> {
        let mut state = self.shared.state.lock();
        let span = state
            .host
            .bytes_mut(dst.as_raw(), data.len() as u64)
            .ok_or_else(|| {
                AccelError::Transfer(format!(
                    "host write of {} bytes at {:#x} is outside any pinned allocation",
                    data.len(),
                    dst.as_raw()
                ))
            })?;
        span.copy_from_slice(data);
        Ok(())
    }

    fn read_host(&self, src: HostPtr, out: &mut [u8]) -> Result<()> {
        let state = self.shared.state.lock();
        let span = state
            .host
            .bytes(src.as_raw(), out.len() as u64)
            .ok_or_else(|| {
                AccelError::Transfer(format!(
                    "host read of {} bytes at {:#x} is outside any pinned allocation",
                    out.len(),
                    src.as_raw()
                ))
            })?;
        out.copy_from_slice(span);
        Ok(())
    }

    fn create_generator(&self, seed: u64) -> Result<Box<dyn RandomGenerator>> {
        let stream = self.shared.state.lock().streams.create();
        self.shared.generators_created.fetch_add(1, Ordering::SeqCst);
        debug!(seed, stream = stream.as_raw(), "Generator created");
        Ok(Box::new(SimGenerator::new(
            Arc::clone(&self.shared),
            stream,
            seed,
        )))
    }
}
