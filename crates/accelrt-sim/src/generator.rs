//! Random generator for the simulated device.
//!
//! Values are drawn from a Philox stream when the fill is enqueued and land
//! in device memory when the generator's stream is joined.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use accelrt_core::backend::RandomGenerator;
use accelrt_core::error::{AccelError, Result};
use accelrt_core::memory::{DevicePtr, StreamHandle};
use accelrt_rand::Philox;

use crate::device::Shared;
use crate::queue::Op;

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Generator bound to a dedicated stream of a [`SimDevice`](crate::SimDevice).
pub struct SimGenerator {
    shared: Arc<Shared>,
    stream: StreamHandle,
    rng: Mutex<Philox>,
}

impl SimGenerator {
    pub(crate) fn new(shared: Arc<Shared>, stream: StreamHandle, seed: u64) -> Self {
        Self {
            shared,
            stream,
            rng: Mutex::new(Philox::new(seed)),
        }
    }

    fn fill<F>(&self, dst: DevicePtr, count: u64, sample: F) -> Result<()>
    where
        F: FnOnce(&mut Philox, &mut [f32]) -> Result<()>,
    {
        let bytes = count.checked_mul(F32_BYTES).ok_or_else(|| {
            AccelError::RandomGen(format!("{} values overflow the address space", count))
        })?;

        // Lock order: device state, then rng.
        let mut state = self.shared.state.lock();
        if !state.pool.is_live_range(dst.as_raw(), bytes) {
            return Err(AccelError::RandomGen(format!(
                "{} values at {:#x} do not fit in a live device allocation",
                count,
                dst.as_raw()
            )));
        }

        let mut values = vec![0f32; count as usize];
        let mut rng = self.rng.lock();
        sample(&mut *rng, values.as_mut_slice())?;
        drop(rng);

        state
            .enqueue(
                self.stream,
                Op::Write {
                    dst: dst.as_raw(),
                    data: bytemuck::cast_slice(&values).to_vec(),
                },
            )
            .map_err(|e| AccelError::RandomGen(e.to_string()))
    }
}

impl RandomGenerator for SimGenerator {
    fn generate_uniform(&self, dst: DevicePtr, count: u64) -> Result<()> {
        self.fill(dst, count, |rng, out| {
            rng.fill_uniform(out);
            Ok(())
        })
    }

    fn generate_normal(&self, dst: DevicePtr, count: u64, mean: f32, stddev: f32) -> Result<()> {
        self.fill(dst, count, |rng, out| rng.fill_normal(out, mean, stddev))
    }

    fn stream(&self) -> StreamHandle {
        self.stream
    }
}

impl Drop for SimGenerator {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        let _ = state.run_stream(self.stream);
        let _ = state.streams.remove(self.stream);
        debug!(stream = self.stream.as_raw(), "Generator stream released");
    }
}

#[cfg(test)]
mod tests {
    use accelrt_core::backend::DeviceBackend;
    use accelrt_core::config::SimConfig;
    use accelrt_core::memory::MemcpyKind;

    use super::*;
    use crate::SimDevice;

    fn read_f32s(dev: &SimDevice, src: DevicePtr, count: usize) -> Vec<f32> {
        let bytes = (count * 4) as u64;
        let host = dev.alloc_pinned_host(bytes).unwrap();
        dev.synchronize().unwrap();
        dev.memcpy_async(
            src.as_raw(),
            host.as_raw(),
            bytes,
            MemcpyKind::DeviceToHost,
            StreamHandle::DEFAULT,
        )
        .unwrap();
        dev.synchronize().unwrap();
        let mut raw = vec![0u8; bytes as usize];
        dev.read_host(host, &mut raw).unwrap();
        dev.free_pinned_host(host).unwrap();
        raw.chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn device_with_buffer(bytes: u64) -> (SimDevice, DevicePtr) {
        let dev = SimDevice::new(SimConfig::minimal());
        let ptr = dev
            .alloc_async(bytes, StreamHandle::DEFAULT)
            .unwrap()
            .ptr()
            .unwrap();
        (dev, ptr)
    }

    #[test]
    fn test_uniform_fill_lands_on_join() {
        let (dev, ptr) = device_with_buffer(4 * 1000);
        let gen = dev.create_generator(42).unwrap();
        gen.generate_uniform(ptr, 1000).unwrap();
        assert_eq!(dev.pending_ops(gen.stream()).unwrap(), 1);

        let values = read_f32s(&dev, ptr, 1000);
        assert!(values.iter().all(|v| (0.0..1.0).contains(v)));
        assert!(values.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_same_seed_same_values() {
        let (dev, a) = device_with_buffer(64 * 4);
        let b = dev
            .alloc_async(64 * 4, StreamHandle::DEFAULT)
            .unwrap()
            .ptr()
            .unwrap();

        dev.create_generator(7).unwrap().generate_uniform(a, 64).unwrap();
        dev.create_generator(7).unwrap().generate_uniform(b, 64).unwrap();

        assert_eq!(read_f32s(&dev, a, 64), read_f32s(&dev, b, 64));
    }

    #[test]
    fn test_normal_rejects_odd_count() {
        let (dev, ptr) = device_with_buffer(256);
        let gen = dev.create_generator(1).unwrap();
        let err = gen.generate_normal(ptr, 5, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, AccelError::RandomGen(_)));
        assert_eq!(dev.pending_ops(gen.stream()).unwrap(), 0);
    }

    #[test]
    fn test_fill_outside_allocation() {
        let (dev, ptr) = device_with_buffer(256);
        let gen = dev.create_generator(1).unwrap();
        // 65 floats overrun the 256-byte granule.
        let err = gen.generate_uniform(ptr, 65).unwrap_err();
        assert!(matches!(err, AccelError::RandomGen(_)));

        let err = gen
            .generate_uniform(DevicePtr::from_raw(8), 1)
            .unwrap_err();
        assert!(matches!(err, AccelError::RandomGen(_)));
    }

    #[test]
    fn test_dropping_generator_flushes_its_stream() {
        let (dev, ptr) = device_with_buffer(16);
        let gen = dev.create_generator(3).unwrap();
        let stream = gen.stream();
        gen.generate_normal(ptr, 4, 10.0, 0.5).unwrap();
        drop(gen);

        assert!(dev.pending_ops(stream).is_err());
        let values = read_f32s(&dev, ptr, 4);
        assert!(values.iter().all(|v| (*v - 10.0).abs() < 5.0));
    }
}
