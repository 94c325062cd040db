//! Simulated page-locked host memory.

use std::collections::BTreeMap;

use tracing::debug;

use accelrt_core::error::{AccelError, Result};
use accelrt_core::memory::HostPtr;

use crate::pool::{locate_range, zeroed_backing};

/// Base of the simulated pinned host address range.
pub const HOST_ADDRESS_BASE: u64 = 0x5500_0000_0000;

/// Pinned host allocations, bounded by a page-lock limit.
#[derive(Debug)]
pub struct PinnedHeap {
    limit: u64,
    granularity: u64,
    used: u64,
    next_addr: u64,
    blocks: BTreeMap<u64, Box<[u8]>>,
}

impl PinnedHeap {
    /// Heap that may page-lock at most `limit` bytes.
    #[must_use]
    pub fn new(limit: u64, granularity: u64) -> Self {
        Self {
            limit,
            granularity: granularity.max(1),
            used: 0,
            next_addr: HOST_ADDRESS_BASE,
            blocks: BTreeMap::new(),
        }
    }

    /// Bytes currently page-locked.
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.used
    }

    /// Number of live pinned buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no pinned buffers are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Page-lock `bytes` of host memory.
    pub fn allocate(&mut self, bytes: u64) -> Result<HostPtr> {
        let size = bytes.max(1);
        if self.used.saturating_add(size) > self.limit {
            return Err(AccelError::Allocation {
                size: bytes,
                reason: format!(
                    "pinned host limit exceeded ({} of {} bytes locked)",
                    self.used, self.limit
                ),
            });
        }

        let data = zeroed_backing(size).ok_or_else(|| AccelError::Allocation {
            size: bytes,
            reason: "host could not back the pinned buffer".to_string(),
        })?;

        let addr = self.next_addr;
        self.next_addr += size.div_ceil(self.granularity) * self.granularity;
        self.blocks.insert(addr, data);
        self.used += size;
        debug!(ptr = format_args!("{:#x}", addr), bytes, "Pinned host buffer");

        Ok(HostPtr::from_raw(addr))
    }

    /// Unlock and release a pinned buffer.
    pub fn free(&mut self, ptr: HostPtr) -> Result<u64> {
        let addr = ptr.as_raw();
        let block = self.blocks.remove(&addr).ok_or_else(|| AccelError::Free {
            ptr: addr,
            reason: "not the base address of a pinned host allocation".to_string(),
        })?;
        let size = block.len() as u64;
        self.used -= size;
        Ok(size)
    }

    /// Whether `[addr, addr + len)` lies within one pinned buffer.
    #[must_use]
    pub fn contains(&self, addr: u64, len: u64) -> bool {
        locate_range(&self.blocks, addr, len, |b| b.len() as u64).is_some()
    }

    /// Bytes at `[addr, addr + len)`.
    #[must_use]
    pub fn bytes(&self, addr: u64, len: u64) -> Option<&[u8]> {
        let (base, offset) = locate_range(&self.blocks, addr, len, |b| b.len() as u64)?;
        self.blocks
            .get(&base)
            .map(|b| &b[offset..offset + len as usize])
    }

    /// Mutable bytes at `[addr, addr + len)`.
    pub fn bytes_mut(&mut self, addr: u64, len: u64) -> Option<&mut [u8]> {
        let (base, offset) = locate_range(&self.blocks, addr, len, |b| b.len() as u64)?;
        self.blocks
            .get_mut(&base)
            .map(|b| &mut b[offset..offset + len as usize])
    }
}
