//! Handle types for device memory, pinned host memory, streams and events.
//!
//! Handles cross the flat ABI as plain `u64` addresses. Inside the crate they
//! are wrapped in distinct newtypes so a device pointer cannot be passed where
//! a pinned host pointer or an event is expected.

use std::fmt;

use crate::error::{AccelError, Result};

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// The zero sentinel.
            pub const NULL: Self = Self(0);

            /// Wrap a raw 64-bit handle.
            #[must_use]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw 64-bit handle for the flat ABI.
            #[must_use]
            pub const fn as_raw(self) -> u64 {
                self.0
            }

            /// Whether this is the zero sentinel.
            #[must_use]
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#x})"), self.0)
            }
        }

        impl From<$name> for u64 {
            fn from(h: $name) -> u64 {
                h.0
            }
        }
    };
}

opaque_handle!(
    /// Address of a stream-ordered device allocation. Not host-dereferenceable.
    DevicePtr
);

opaque_handle!(
    /// Address of page-locked host memory.
    HostPtr
);

opaque_handle!(
    /// Identifier of an ordered work queue. Zero is the process-default queue.
    StreamHandle
);

opaque_handle!(
    /// Timeline marker placed on a work queue.
    EventHandle
);

impl StreamHandle {
    /// The process-default queue.
    pub const DEFAULT: Self = Self::NULL;

    /// Whether this is the process-default queue.
    #[must_use]
    pub const fn is_default(self) -> bool {
        self.is_null()
    }
}

impl DevicePtr {
    /// Address `bytes` past this one. Wraps instead of overflowing; a
    /// wrapped address lies in no allocation and is rejected downstream.
    #[must_use]
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

impl HostPtr {
    /// Address `bytes` past this one. Wraps instead of overflowing; a
    /// wrapped address lies in no allocation and is rejected downstream.
    #[must_use]
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

/// Copy direction.
///
/// Discriminants match the flat ABI encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MemcpyKind {
    /// Pinned host to pinned host.
    HostToHost = 0,
    /// Pinned host to device.
    HostToDevice = 1,
    /// Device to pinned host.
    DeviceToHost = 2,
    /// Device to device.
    DeviceToDevice = 3,
}

impl MemcpyKind {
    /// Returns all directions in ABI order.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [
            Self::HostToHost,
            Self::HostToDevice,
            Self::DeviceToHost,
            Self::DeviceToDevice,
        ]
    }

    /// Whether the source address is expected to be device memory.
    #[must_use]
    pub const fn src_is_device(self) -> bool {
        matches!(self, Self::DeviceToHost | Self::DeviceToDevice)
    }

    /// Whether the destination address is expected to be device memory.
    #[must_use]
    pub const fn dst_is_device(self) -> bool {
        matches!(self, Self::HostToDevice | Self::DeviceToDevice)
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::HostToHost => "HtoH",
            Self::HostToDevice => "HtoD",
            Self::DeviceToHost => "DtoH",
            Self::DeviceToDevice => "DtoD",
        }
    }
}

impl TryFrom<u32> for MemcpyKind {
    type Error = AccelError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::HostToHost),
            1 => Ok(Self::HostToDevice),
            2 => Ok(Self::DeviceToHost),
            3 => Ok(Self::DeviceToDevice),
            other => Err(AccelError::Transfer(format!(
                "invalid copy direction {}",
                other
            ))),
        }
    }
}

/// Point-in-time memory snapshot of the active device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemInfo {
    /// Bytes currently available for allocation.
    pub free_bytes: u64,
    /// Total device memory in bytes.
    pub total_bytes: u64,
}

impl MemInfo {
    /// Bytes not currently available.
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }
}

/// Result of a pooled device allocation.
///
/// Out-of-memory is an expected condition that callers handle with
/// eviction or retry, so it is kept out of the error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum AllocOutcome {
    /// Allocation succeeded.
    Allocated(DevicePtr),
    /// The pool could not satisfy the request.
    OutOfMemory {
        /// Requested size in bytes.
        requested: u64,
    },
}

impl AllocOutcome {
    /// Device pointer, or the zero sentinel on out-of-memory.
    pub fn into_raw(self) -> u64 {
        match self {
            Self::Allocated(ptr) => ptr.as_raw(),
            Self::OutOfMemory { .. } => 0,
        }
    }

    /// Device pointer if the allocation succeeded.
    pub fn ptr(self) -> Option<DevicePtr> {
        match self {
            Self::Allocated(ptr) => Some(ptr),
            Self::OutOfMemory { .. } => None,
        }
    }

    /// Whether the pool reported out-of-memory.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memcpy_kind_abi_values() {
        assert_eq!(MemcpyKind::HostToHost as u32, 0);
        assert_eq!(MemcpyKind::HostToDevice as u32, 1);
        assert_eq!(MemcpyKind::DeviceToHost as u32, 2);
        assert_eq!(MemcpyKind::DeviceToDevice as u32, 3);
        for kind in MemcpyKind::all() {
            assert_eq!(MemcpyKind::try_from(kind as u32).unwrap(), kind);
        }
    }

    #[test]
    fn test_memcpy_kind_rejects_unknown() {
        let err = MemcpyKind::try_from(4).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transfer);
    }

    #[test]
    fn test_memcpy_kind_sides() {
        assert!(!MemcpyKind::HostToHost.src_is_device());
        assert!(MemcpyKind::HostToDevice.dst_is_device());
        assert!(MemcpyKind::DeviceToHost.src_is_device());
        assert!(!MemcpyKind::DeviceToHost.dst_is_device());
        assert!(MemcpyKind::DeviceToDevice.src_is_device());
    }

    #[test]
    fn test_alloc_outcome_sentinel() {
        let ok = AllocOutcome::Allocated(DevicePtr::from_raw(0x1000));
        assert_eq!(ok.into_raw(), 0x1000);
        assert_eq!(ok.ptr(), Some(DevicePtr::from_raw(0x1000)));

        let oom = AllocOutcome::OutOfMemory { requested: 1 << 40 };
        assert_eq!(oom.into_raw(), 0);
        assert!(oom.is_out_of_memory());
        assert!(oom.ptr().is_none());
    }

    #[test]
    fn test_handle_debug_and_null() {
        assert!(StreamHandle::DEFAULT.is_default());
        assert!(EventHandle::NULL.is_null());
        assert_eq!(
            format!("{:?}", DevicePtr::from_raw(0x100)),
            "DevicePtr(0x100)"
        );
        assert_eq!(DevicePtr::from_raw(0x100).offset(0x20).as_raw(), 0x120);
    }

    #[test]
    fn test_offset_wraps_at_address_space_end() {
        assert_eq!(DevicePtr::from_raw(u64::MAX).offset(2).as_raw(), 1);
        assert_eq!(HostPtr::from_raw(u64::MAX - 1).offset(3).as_raw(), 1);
        assert_eq!(HostPtr::from_raw(0x40).offset(0x10).as_raw(), 0x50);
    }

    #[test]
    fn test_mem_info_used() {
        let info = MemInfo {
            free_bytes: 30,
            total_bytes: 100,
        };
        assert_eq!(info.used_bytes(), 70);
    }
}
