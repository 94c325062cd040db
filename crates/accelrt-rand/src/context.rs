//! Process-wide random context.
//!
//! The first random fill constructs a generator on the active device, seeds
//! it once and keeps it for the life of the process. Construction is guarded
//! so that concurrent first calls build exactly one generator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::{debug, info};

use accelrt_core::backend::{DeviceBackend, RandomGenerator};
use accelrt_core::error::{AccelError, Result};
use accelrt_core::memory::{DevicePtr, StreamHandle};

use crate::seed::entropy_seed;

/// A seeded generator plus bookkeeping.
pub struct RandomContext {
    generator: Box<dyn RandomGenerator>,
    seed: u64,
    drawn: AtomicU64,
}

impl RandomContext {
    /// Build a generator on `backend` with an entropy seed.
    pub fn new(backend: &dyn DeviceBackend) -> Result<Self> {
        Self::with_seed(backend, entropy_seed())
    }

    /// Build a generator on `backend` with a fixed seed.
    pub fn with_seed(backend: &dyn DeviceBackend, seed: u64) -> Result<Self> {
        let generator = backend.create_generator(seed)?;
        info!(
            backend = %backend.backend(),
            seed,
            stream = ?generator.stream(),
            "Random context initialized"
        );
        Ok(Self::from_generator(generator, seed))
    }

    /// Wrap an already-constructed generator.
    #[must_use]
    pub fn from_generator(generator: Box<dyn RandomGenerator>, seed: u64) -> Self {
        Self {
            generator,
            seed,
            drawn: AtomicU64::new(0),
        }
    }

    /// Seed the generator was created with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Total f32 values written so far, padding included.
    #[must_use]
    pub fn values_drawn(&self) -> u64 {
        self.drawn.load(Ordering::Relaxed)
    }

    /// Queue the generator enqueues onto.
    #[must_use]
    pub fn stream(&self) -> StreamHandle {
        self.generator.stream()
    }

    /// Fill `count` f32 values uniformly in `[0, 1)`.
    pub fn generate_uniform(&self, dst: DevicePtr, count: u64) -> Result<()> {
        self.generator.generate_uniform(dst, count)?;
        self.drawn.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    /// Fill `count` f32 values from Normal(mean, stddev²).
    ///
    /// The generator produces values in pairs, so an odd `count` is rounded
    /// up and one value is written at `dst[count]`. The destination must have
    /// room for it; device allocations are padded to their granularity, which
    /// covers this for any buffer that came from the pool.
    pub fn generate_normal(
        &self,
        dst: DevicePtr,
        count: u64,
        mean: f32,
        stddev: f32,
    ) -> Result<()> {
        let padded = padded_normal_count(count);
        if padded != count {
            debug!(
                requested = count,
                written = padded,
                "Padding normal fill to an even count"
            );
        }
        self.generator.generate_normal(dst, padded, mean, stddev)?;
        self.drawn.fetch_add(padded, Ordering::Relaxed);
        Ok(())
    }
}

impl std::fmt::Debug for RandomContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomContext")
            .field("seed", &self.seed)
            .field("stream", &self.generator.stream())
            .field("drawn", &self.values_drawn())
            .finish()
    }
}

/// Number of values a normal fill of `count` actually writes.
#[must_use]
pub const fn padded_normal_count(count: u64) -> u64 {
    count + (count & 1)
}

/// Lazily constructed [`RandomContext`].
///
/// Readers take the lock-free path once the context exists. The first
/// callers serialize on `init_lock`; a failed construction leaves the cell
/// empty so the next call retries.
pub struct LazyRandomContext {
    cell: OnceLock<RandomContext>,
    init_lock: Mutex<()>,
}

impl LazyRandomContext {
    /// Empty, uninitialized context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Context, building it on `backend` on first use.
    pub fn get_or_init(&self, backend: &dyn DeviceBackend) -> Result<&RandomContext> {
        self.get_or_try_init_with(|| RandomContext::new(backend))
    }

    /// Context, building it with `init` on first use.
    pub fn get_or_try_init_with<F>(&self, init: F) -> Result<&RandomContext>
    where
        F: FnOnce() -> Result<RandomContext>,
    {
        if let Some(ctx) = self.cell.get() {
            return Ok(ctx);
        }

        let _guard = self.init_lock.lock();
        if let Some(ctx) = self.cell.get() {
            return Ok(ctx);
        }

        let ctx = init()?;
        // Only the lock holder reaches this point, so the cell is still empty.
        let _ = self.cell.set(ctx);
        self.cell.get().ok_or_else(|| {
            AccelError::RandomGen("random context vanished after initialization".to_string())
        })
    }

    /// Context if it has been built.
    #[must_use]
    pub fn get(&self) -> Option<&RandomContext> {
        self.cell.get()
    }

    /// Whether the context has been built.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl Default for LazyRandomContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LazyRandomContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyRandomContext")
            .field("context", &self.cell.get())
            .finish()
    }
}
