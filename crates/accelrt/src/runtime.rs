//! Runtime: one device backend plus the lazily built random context.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{info, warn};

use accelrt_core::backend::{Backend, DeviceBackend};
use accelrt_core::config::{AccelConfig, SimConfig};
use accelrt_core::error::{AccelError, Result};
use accelrt_core::memory::{
    AllocOutcome, DevicePtr, EventHandle, HostPtr, MemInfo, MemcpyKind, StreamHandle,
};
use accelrt_cuda::CudaDevice;
use accelrt_rand::{LazyRandomContext, RandomContext};
use accelrt_sim::SimDevice;

/// Device backend plus process state layered on top of it.
///
/// Methods without a stream argument target the default stream.
pub struct Runtime {
    backend: Arc<dyn DeviceBackend>,
    random: LazyRandomContext,
}

impl Runtime {
    /// Runtime over an existing backend.
    pub fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        info!(backend = %backend.backend(), "Runtime created");
        Self {
            backend,
            random: LazyRandomContext::new(),
        }
    }

    /// Runtime over a fresh simulated device.
    pub fn sim(config: SimConfig) -> Self {
        Self::new(Arc::new(SimDevice::new(config)))
    }

    /// Runtime for the backend named in `config`.
    ///
    /// `auto` opens CUDA device `device_id` when one is present and falls
    /// back to the simulator otherwise.
    pub fn from_config(config: &AccelConfig) -> Result<Self> {
        config.validate()?;

        match config.backend.as_str() {
            "sim" => Ok(Self::sim(config.sim.clone())),
            "cuda" => Ok(Self::new(Arc::new(CudaDevice::new(config.device_id)?))),
            "auto" => {
                if accelrt_cuda::is_cuda_available() {
                    match CudaDevice::new(config.device_id) {
                        Ok(dev) => return Ok(Self::new(Arc::new(dev))),
                        Err(e) => warn!(error = %e, "CUDA present but unusable, using simulator"),
                    }
                }
                Ok(Self::sim(config.sim.clone()))
            }
            other => Err(AccelError::InvalidConfig(format!(
                "Unknown backend '{}'",
                other
            ))),
        }
    }

    /// Active backend.
    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.backend
    }

    /// Kind of the active backend.
    pub fn backend_kind(&self) -> Backend {
        self.backend.backend()
    }

    /// Free and total device memory.
    pub fn mem_info(&self) -> Result<MemInfo> {
        self.backend.mem_info()
    }

    /// Pooled allocation on the default stream.
    pub fn alloc_async(&self, bytes: u64) -> Result<AllocOutcome> {
        self.backend.alloc_async(bytes, StreamHandle::DEFAULT)
    }

    /// Pooled allocation on `stream`.
    pub fn alloc_async_on(&self, bytes: u64, stream: StreamHandle) -> Result<AllocOutcome> {
        self.backend.alloc_async(bytes, stream)
    }

    /// Release to the pool on the default stream.
    pub fn free_async(&self, ptr: DevicePtr) -> Result<()> {
        self.backend.free_async(ptr, StreamHandle::DEFAULT)
    }

    /// Release to the pool on `stream`.
    pub fn free_async_on(&self, ptr: DevicePtr, stream: StreamHandle) -> Result<()> {
        self.backend.free_async(ptr, stream)
    }

    /// Page-locked host allocation.
    pub fn alloc_pinned_host(&self, bytes: u64) -> Result<HostPtr> {
        self.backend.alloc_pinned_host(bytes)
    }

    /// Release page-locked host memory.
    pub fn free_pinned_host(&self, ptr: HostPtr) -> Result<()> {
        self.backend.free_pinned_host(ptr)
    }

    /// Release cached pool memory down to `min_bytes_to_keep`.
    pub fn trim_pool(&self, min_bytes_to_keep: u64) -> Result<()> {
        self.backend.trim_pool(min_bytes_to_keep)
    }

    /// Byte fill on the default stream.
    pub fn memset_async(&self, dst: DevicePtr, bytes: u64, value: u8) -> Result<()> {
        self.backend
            .memset_async(dst, bytes, value, StreamHandle::DEFAULT)
    }

    /// Byte fill on `stream`.
    pub fn memset_async_on(
        &self,
        dst: DevicePtr,
        bytes: u64,
        value: u8,
        stream: StreamHandle,
    ) -> Result<()> {
        self.backend.memset_async(dst, bytes, value, stream)
    }

    /// Copy on the default stream.
    pub fn memcpy_async(&self, src: u64, dst: u64, bytes: u64, kind: MemcpyKind) -> Result<()> {
        self.backend
            .memcpy_async(src, dst, bytes, kind, StreamHandle::DEFAULT)
    }

    /// Copy on `stream`.
    pub fn memcpy_async_on(
        &self,
        src: u64,
        dst: u64,
        bytes: u64,
        kind: MemcpyKind,
        stream: StreamHandle,
    ) -> Result<()> {
        self.backend.memcpy_async(src, dst, bytes, kind, stream)
    }

    /// Block until every stream has drained.
    pub fn synchronize_device(&self) -> Result<()> {
        self.backend.synchronize()
    }

    /// Create a stream.
    pub fn create_stream(&self) -> Result<StreamHandle> {
        self.backend.create_stream()
    }

    /// Destroy a stream after its queued work completes.
    pub fn destroy_stream(&self, stream: StreamHandle) -> Result<()> {
        self.backend.destroy_stream(stream)
    }

    /// Block until `stream` has drained.
    pub fn synchronize_stream(&self, stream: StreamHandle) -> Result<()> {
        self.backend.synchronize_stream(stream)
    }

    /// Create a timing event.
    pub fn create_event(&self) -> Result<EventHandle> {
        self.backend.create_event()
    }

    /// Destroy a timing event.
    pub fn destroy_event(&self, event: EventHandle) -> Result<()> {
        self.backend.destroy_event(event)
    }

    /// Record `event` on `stream`.
    pub fn record_event(&self, event: EventHandle, stream: StreamHandle) -> Result<()> {
        self.backend.record_event(event, stream)
    }

    /// Milliseconds between two completed events.
    pub fn elapsed_time(&self, start: EventHandle, end: EventHandle) -> Result<f32> {
        self.backend.elapsed_time(start, end)
    }

    /// Copy bytes into pinned host memory.
    pub fn write_host(&self, dst: HostPtr, data: &[u8]) -> Result<()> {
        self.backend.write_host(dst, data)
    }

    /// Copy bytes out of pinned host memory.
    pub fn read_host(&self, src: HostPtr, out: &mut [u8]) -> Result<()> {
        self.backend.read_host(src, out)
    }

    /// Random context, constructed on first use.
    pub fn random(&self) -> Result<&RandomContext> {
        self.random.get_or_init(self.backend.as_ref())
    }

    /// Random context if something has already used it.
    pub fn random_if_initialized(&self) -> Option<&RandomContext> {
        self.random.get()
    }

    /// Fill `count` f32 values uniformly in `[0, 1)`.
    pub fn generate_uniform(&self, dst: DevicePtr, count: u64) -> Result<()> {
        self.random()?.generate_uniform(dst, count)
    }

    /// Fill `count` f32 values from Normal(mean, stddev²).
    ///
    /// An odd `count` writes `count + 1` values; see
    /// [`RandomContext::generate_normal`].
    pub fn generate_normal(
        &self,
        dst: DevicePtr,
        count: u64,
        mean: f32,
        stddev: f32,
    ) -> Result<()> {
        self.random()?.generate_normal(dst, count, mean, stddev)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("backend", &self.backend.backend())
            .field("random", &self.random)
            .finish()
    }
}

static GLOBAL: OnceLock<Runtime> = OnceLock::new();
static GLOBAL_INIT: Mutex<()> = Mutex::new(());

/// The process-wide runtime.
///
/// Built on first use from `ACCELRT__*` environment variables unless
/// [`install`] ran first.
pub fn global() -> Result<&'static Runtime> {
    if let Some(rt) = GLOBAL.get() {
        return Ok(rt);
    }

    let _guard = GLOBAL_INIT.lock();
    if let Some(rt) = GLOBAL.get() {
        return Ok(rt);
    }

    let config = AccelConfig::from_env()?;
    let _ = GLOBAL.set(Runtime::from_config(&config)?);
    GLOBAL
        .get()
        .ok_or_else(|| AccelError::BackendUnavailable("global runtime not set".to_string()))
}

/// Install `runtime` as the process-wide runtime. Fails if one already exists.
pub fn install(runtime: Runtime) -> Result<&'static Runtime> {
    let _guard = GLOBAL_INIT.lock();
    GLOBAL.set(runtime).map_err(|_| {
        AccelError::InvalidConfig("a global runtime is already installed".to_string())
    })?;
    GLOBAL
        .get()
        .ok_or_else(|| AccelError::BackendUnavailable("global runtime not set".to_string()))
}

/// Whether the process-wide runtime exists.
pub fn is_installed() -> bool {
    GLOBAL.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use accelrt_core::config::ConfigBuilder;

    #[test]
    fn test_from_config_sim() {
        let config = ConfigBuilder::new()
            .backend("sim")
            .sim_total_memory(1 << 20)
            .build()
            .unwrap();
        let rt = Runtime::from_config(&config).unwrap();
        assert_eq!(rt.backend_kind(), Backend::Sim);
        assert_eq!(rt.mem_info().unwrap().total_bytes, 1 << 20);
    }

    #[test]
    fn test_from_config_rejects_unknown_backend() {
        let mut config = AccelConfig::default();
        config.backend = "metal".to_string();
        let err = Runtime::from_config(&config).unwrap_err();
        assert!(matches!(err, AccelError::InvalidConfig(_)));
    }

    #[test]
    #[cfg(not(feature = "cuda"))]
    fn test_auto_falls_back_to_sim() {
        let rt = Runtime::from_config(&AccelConfig::default()).unwrap();
        assert_eq!(rt.backend_kind(), Backend::Sim);

        let mut config = AccelConfig::default();
        config.backend = "cuda".to_string();
        let err = Runtime::from_config(&config).unwrap_err();
        assert!(matches!(err, AccelError::BackendUnavailable(_)));
    }

    #[test]
    fn test_random_context_is_lazy() {
        let rt = Runtime::sim(SimConfig::minimal());
        assert!(rt.random_if_initialized().is_none());

        let ptr = rt.alloc_async(64).unwrap().ptr().unwrap();
        rt.generate_uniform(ptr, 16).unwrap();
        let seed = rt.random().unwrap().seed();
        rt.generate_uniform(ptr, 16).unwrap();

        let ctx = rt.random_if_initialized().unwrap();
        assert_eq!(ctx.seed(), seed);
        assert_eq!(ctx.values_drawn(), 32);
    }
}
