//! Stream-ordered device memory pool.
//!
//! Every block reserved from the simulated device stays in the pool until it
//! is trimmed or evicted:
//!
//! ```text
//!   allocate          free_async          queue drained        trim / evict
//! ──────────► Live ─────────────► PendingFree ────────► Cached ─────────────► released
//!              ▲                                          │
//!              └──────────────── allocate (reuse) ────────┘
//! ```
//!
//! `mem_info` reports every reserved byte as used, so freed blocks only show
//! up as free device memory once the pool releases them.

use std::collections::BTreeMap;

use tracing::debug;

use accelrt_core::error::{AccelError, Result};
use accelrt_core::memory::DevicePtr;

/// Base of the simulated device address range.
pub const DEVICE_ADDRESS_BASE: u64 = 0x7f00_0000_0000;

/// A cached block is only reused for requests at least half its capacity.
const REUSE_SLACK: u64 = 2;

/// Lifecycle state of a pool block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Handed out to a caller.
    Live,
    /// Release is queued but has not executed yet.
    PendingFree,
    /// Released in queue order; reusable.
    Cached,
}

/// One reservation from the simulated device.
#[derive(Debug)]
pub struct Block {
    capacity: u64,
    requested: u64,
    state: BlockState,
    data: Box<[u8]>,
}

impl Block {
    /// Reserved size, a multiple of the pool granularity.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Size the current owner asked for.
    #[must_use]
    pub fn requested(&self) -> u64 {
        self.requested
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> BlockState {
        self.state
    }
}

/// Pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Bytes currently reserved from the device (in use + pending + cached).
    pub reserved_bytes: u64,
    /// Bytes handed out to callers.
    pub in_use_bytes: u64,
    /// Bytes whose release is still queued.
    pub pending_free_bytes: u64,
    /// Bytes held in the cache.
    pub cached_bytes: u64,
    /// Highest `reserved_bytes` seen.
    pub high_water_bytes: u64,
    /// Successful allocations.
    pub allocations: u64,
    /// Allocations served from the cache.
    pub reuses: u64,
    /// Allocations that failed with out-of-memory.
    pub out_of_memory: u64,
    /// Blocks returned to the device by trim or eviction.
    pub releases: u64,
}

impl PoolStats {
    /// Fraction of allocations served from the cache.
    #[must_use]
    pub fn reuse_rate(&self) -> f64 {
        if self.allocations == 0 {
            0.0
        } else {
            self.reuses as f64 / self.allocations as f64
        }
    }
}

/// Device memory pool over a fixed-capacity simulated device.
#[derive(Debug)]
pub struct DevicePool {
    total: u64,
    granularity: u64,
    blocks: BTreeMap<u64, Block>,
    next_addr: u64,
    stats: PoolStats,
}

impl DevicePool {
    /// Pool over `total` bytes with the given allocation granularity.
    #[must_use]
    pub fn new(total: u64, granularity: u64) -> Self {
        Self {
            total,
            granularity: granularity.max(1),
            blocks: BTreeMap::new(),
            next_addr: DEVICE_ADDRESS_BASE,
            stats: PoolStats::default(),
        }
    }

    /// Total device capacity.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    /// Device bytes not reserved by the pool.
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.total - self.stats.reserved_bytes
    }

    /// Snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Size a request occupies once rounded to the granularity. Zero-byte
    /// requests still occupy one granule so every allocation has a unique
    /// non-null address.
    #[must_use]
    pub fn rounded(&self, bytes: u64) -> u64 {
        bytes.max(1).div_ceil(self.granularity).saturating_mul(self.granularity)
    }

    /// Allocate `bytes`. Returns `None` when the device cannot satisfy the
    /// request even after evicting every cached block.
    pub fn allocate(&mut self, bytes: u64) -> Option<DevicePtr> {
        let capacity = self.rounded(bytes);

        if let Some(addr) = self.best_cached_fit(capacity) {
            if let Some(block) = self.blocks.get_mut(&addr) {
                block.state = BlockState::Live;
                block.requested = bytes;
                self.stats.cached_bytes -= block.capacity;
                self.stats.in_use_bytes += block.capacity;
                self.stats.allocations += 1;
                self.stats.reuses += 1;
                debug!(ptr = format_args!("{:#x}", addr), bytes, "Reused cached block");
                return Some(DevicePtr::from_raw(addr));
            }
        }

        if capacity > self.total {
            self.stats.out_of_memory += 1;
            return None;
        }

        while self.free_bytes() < capacity {
            if !self.release_largest_cached() {
                self.stats.out_of_memory += 1;
                debug!(
                    bytes,
                    free = self.free_bytes(),
                    "Pool exhausted after evicting cache"
                );
                return None;
            }
        }

        let Some(data) = zeroed_backing(capacity) else {
            self.stats.out_of_memory += 1;
            debug!(bytes, capacity, "Host could not back simulated block");
            return None;
        };

        let addr = self.next_addr;
        self.next_addr += capacity;
        self.blocks.insert(
            addr,
            Block {
                capacity,
                requested: bytes,
                state: BlockState::Live,
                data,
            },
        );

        self.stats.reserved_bytes += capacity;
        self.stats.in_use_bytes += capacity;
        self.stats.allocations += 1;
        self.stats.high_water_bytes = self.stats.high_water_bytes.max(self.stats.reserved_bytes);
        debug!(ptr = format_args!("{:#x}", addr), bytes, capacity, "Reserved block");

        Some(DevicePtr::from_raw(addr))
    }

    fn best_cached_fit(&self, capacity: u64) -> Option<u64> {
        self.blocks
            .iter()
            .filter(|(_, b)| {
                b.state == BlockState::Cached
                    && b.capacity >= capacity
                    && b.capacity <= capacity.saturating_mul(REUSE_SLACK)
            })
            .min_by_key(|(addr, b)| (b.capacity, **addr))
            .map(|(addr, _)| *addr)
    }

    fn release_largest_cached(&mut self) -> bool {
        let victim = self
            .blocks
            .iter()
            .filter(|(_, b)| b.state == BlockState::Cached)
            .max_by_key(|(addr, b)| (b.capacity, std::cmp::Reverse(**addr)))
            .map(|(addr, _)| *addr);

        match victim.and_then(|addr| self.blocks.remove(&addr).map(|b| (addr, b))) {
            Some((addr, block)) => {
                self.stats.cached_bytes -= block.capacity;
                self.stats.reserved_bytes -= block.capacity;
                self.stats.releases += 1;
                debug!(
                    ptr = format_args!("{:#x}", addr),
                    capacity = block.capacity,
                    "Released cached block"
                );
                true
            }
            None => false,
        }
    }

    /// Mark a live block for release. The block keeps its reservation until
    /// [`DevicePool::complete_free`] runs in queue order.
    pub fn begin_free(&mut self, ptr: DevicePtr) -> Result<u64> {
        let addr = ptr.as_raw();
        let block = self.blocks.get_mut(&addr).ok_or_else(|| AccelError::Free {
            ptr: addr,
            reason: "not the base address of a device allocation".to_string(),
        })?;

        if block.state != BlockState::Live {
            return Err(AccelError::Free {
                ptr: addr,
                reason: "allocation already freed".to_string(),
            });
        }

        block.state = BlockState::PendingFree;
        self.stats.in_use_bytes -= block.capacity;
        self.stats.pending_free_bytes += block.capacity;
        Ok(block.capacity)
    }

    /// Move a pending block into the cache. Returns `false` if the block is
    /// not pending release.
    pub fn complete_free(&mut self, ptr: DevicePtr) -> bool {
        match self.blocks.get_mut(&ptr.as_raw()) {
            Some(block) if block.state == BlockState::PendingFree => {
                block.state = BlockState::Cached;
                block.requested = 0;
                self.stats.pending_free_bytes -= block.capacity;
                self.stats.cached_bytes += block.capacity;
                true
            }
            _ => false,
        }
    }

    /// Release cached blocks, largest first, until the pool reserves at most
    /// `min_bytes_to_keep` or the cache is empty. Returns the bytes released.
    pub fn trim(&mut self, min_bytes_to_keep: u64) -> u64 {
        let before = self.stats.reserved_bytes;
        while self.stats.reserved_bytes > min_bytes_to_keep {
            if !self.release_largest_cached() {
                break;
            }
        }
        before - self.stats.reserved_bytes
    }

    /// Block containing `[addr, addr + len)`, with the offset of `addr`.
    #[must_use]
    pub fn locate(&self, addr: u64, len: u64) -> Option<(&Block, usize)> {
        let (base, offset) = locate_range(&self.blocks, addr, len, |b| b.capacity)?;
        self.blocks.get(&base).map(|b| (b, offset))
    }

    /// Whether `[addr, addr + len)` lies in a block the caller still owns.
    #[must_use]
    pub fn is_live_range(&self, addr: u64, len: u64) -> bool {
        matches!(self.locate(addr, len), Some((b, _)) if b.state == BlockState::Live)
    }

    /// Bytes of a live or pending-free block.
    #[must_use]
    pub fn bytes(&self, addr: u64, len: u64) -> Option<&[u8]> {
        let (block, offset) = self.locate(addr, len)?;
        if block.state == BlockState::Cached {
            return None;
        }
        Some(&block.data[offset..offset + len as usize])
    }

    /// Mutable bytes of a live or pending-free block.
    pub fn bytes_mut(&mut self, addr: u64, len: u64) -> Option<&mut [u8]> {
        let (base, offset) = locate_range(&self.blocks, addr, len, |b| b.capacity)?;
        let block = self.blocks.get_mut(&base)?;
        if block.state == BlockState::Cached {
            return None;
        }
        Some(&mut block.data[offset..offset + len as usize])
    }
}

/// Zero-filled host backing for `len` simulated bytes, or `None` when the
/// host cannot provide it.
pub(crate) fn zeroed_backing(len: u64) -> Option<Box<[u8]>> {
    let len = usize::try_from(len).ok()?;
    bytemuck::allocation::try_zeroed_slice_box::<u8>(len).ok()
}

/// Find the entry of `map` whose `[base, base + capacity)` contains
/// `[addr, addr + len)`. Returns the base and the offset of `addr`.
pub(crate) fn locate_range<T>(
    map: &BTreeMap<u64, T>,
    addr: u64,
    len: u64,
    capacity: impl Fn(&T) -> u64,
) -> Option<(u64, usize)> {
    let (&base, entry) = map.range(..=addr).next_back()?;
    let offset = addr - base;
    let end = offset.checked_add(len)?;
    if end > capacity(entry) {
        return None;
    }
    Some((base, offset as usize))
}
