//! cuRAND generator bound to a dedicated stream.

use std::sync::Arc;

use cudarc::curand::result as curand_result;
use cudarc::curand::sys as curand_sys;
use cudarc::driver::CudaContext;
use parking_lot::Mutex;
use tracing::debug;

use accelrt_core::backend::RandomGenerator;
use accelrt_core::error::{AccelError, Result};
use accelrt_core::memory::{DevicePtr, StreamHandle};

use crate::device::RawStream;

struct RawGenerator(curand_sys::curandGenerator_t);

// SAFETY: a cuRAND generator may be used from any thread as long as calls
// are serialized, which the surrounding mutex guarantees.
unsafe impl Send for RawGenerator {}

/// Pseudo-random generator backed by cuRAND's default engine.
pub struct CurandGenerator {
    ctx: Arc<CudaContext>,
    stream: StreamHandle,
    generator: Mutex<RawGenerator>,
}

impl CurandGenerator {
    pub(crate) fn new(
        ctx: Arc<CudaContext>,
        stream: StreamHandle,
        raw_stream: RawStream,
        seed: u64,
    ) -> Result<Self> {
        let rand_err = |what: &str, e: curand_result::CurandError| {
            AccelError::RandomGen(format!("{} failed: {:?}", what, e))
        };

        ctx.bind_to_thread()
            .map_err(|e| AccelError::RandomGen(format!("binding context failed: {:?}", e)))?;

        let generator = curand_result::create_generator()
            .map_err(|e| rand_err("curandCreateGenerator", e))?;

        // SAFETY: the generator was just created and is owned here.
        let configured = unsafe {
            curand_result::set_seed(generator, seed)
                .and_then(|_| curand_result::set_stream(generator, raw_stream.0 as _))
        };
        if let Err(e) = configured {
            // SAFETY: not shared yet.
            unsafe {
                let _ = curand_result::destroy_generator(generator);
            }
            return Err(rand_err("configuring generator", e));
        }

        debug!(seed, stream = stream.as_raw(), "cuRAND generator created");
        Ok(Self {
            ctx,
            stream,
            generator: Mutex::new(RawGenerator(generator)),
        })
    }

    fn bind(&self) -> Result<()> {
        self.ctx
            .bind_to_thread()
            .map_err(|e| AccelError::RandomGen(format!("binding context failed: {:?}", e)))
    }
}

impl RandomGenerator for CurandGenerator {
    fn generate_uniform(&self, dst: DevicePtr, count: u64) -> Result<()> {
        self.bind()?;
        let generator = self.generator.lock();
        // SAFETY: cuRAND validates the device range on its stream.
        unsafe {
            curand_result::generate::uniform_f32(
                generator.0,
                dst.as_raw() as *mut f32,
                count as usize,
            )
        }
        .map_err(|e| AccelError::RandomGen(format!("curandGenerateUniform failed: {:?}", e)))
    }

    fn generate_normal(&self, dst: DevicePtr, count: u64, mean: f32, stddev: f32) -> Result<()> {
        if count % 2 != 0 {
            return Err(AccelError::RandomGen(format!(
                "normal generation requires an even count, got {}",
                count
            )));
        }
        self.bind()?;
        let generator = self.generator.lock();
        // SAFETY: cuRAND validates the device range on its stream.
        unsafe {
            curand_result::generate::normal_f32(
                generator.0,
                dst.as_raw() as *mut f32,
                count as usize,
                mean,
                stddev,
            )
        }
        .map_err(|e| AccelError::RandomGen(format!("curandGenerateNormal failed: {:?}", e)))
    }

    fn stream(&self) -> StreamHandle {
        self.stream
    }
}

impl Drop for CurandGenerator {
    fn drop(&mut self) {
        if self.ctx.bind_to_thread().is_ok() {
            // SAFETY: exclusive access in drop.
            unsafe {
                let _ = curand_result::destroy_generator(self.generator.get_mut().0);
            }
        }
    }
}
