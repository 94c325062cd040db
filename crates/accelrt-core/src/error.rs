//! Error taxonomy for accelrt.
//!
//! Every failure reported by a device driver or random-number library maps to
//! exactly one category. Device out-of-memory during pooled allocation is not
//! an error: it is reported through [`AllocOutcome`](crate::memory::AllocOutcome).

use thiserror::Error;

/// Result type for accelrt operations.
pub type Result<T> = std::result::Result<T, AccelError>;

/// accelrt error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccelError {
    /// Free/total memory query failed.
    #[error("Device query failed: {0}")]
    DeviceQuery(String),

    /// Allocation failed for a reason other than pooled out-of-memory.
    #[error("Allocation of {size} bytes failed: {reason}")]
    Allocation {
        /// Requested size in bytes.
        size: u64,
        /// Driver-reported reason.
        reason: String,
    },

    /// Release of a device or pinned buffer failed.
    #[error("Free of {ptr:#x} failed: {reason}")]
    Free {
        /// Handle that was passed in.
        ptr: u64,
        /// Driver-reported reason.
        reason: String,
    },

    /// Memory pool control failed.
    #[error("Memory pool operation failed: {0}")]
    Pool(String),

    /// Copy or fill could not be enqueued.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Random fill could not be enqueued.
    #[error("Random generation failed: {0}")]
    RandomGen(String),

    /// Event create/destroy/record/elapsed failed.
    #[error("Event operation failed: {0}")]
    Event(String),

    /// Stream create/destroy/synchronize failed.
    #[error("Stream operation failed: {0}")]
    Stream(String),

    /// Configuration rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Requested backend is not compiled in or has no device.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Fieldless error category, stable across the flat ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    /// Device query failure.
    DeviceQuery = 1,
    /// Allocation failure.
    Allocation = 2,
    /// Free failure.
    Free = 3,
    /// Pool failure.
    Pool = 4,
    /// Transfer failure.
    Transfer = 5,
    /// Random generation failure.
    RandomGen = 6,
    /// Event failure.
    Event = 7,
    /// Stream failure.
    Stream = 8,
    /// Configuration failure.
    InvalidConfig = 9,
    /// Backend unavailable.
    BackendUnavailable = 10,
}

impl ErrorKind {
    /// Integer code reported over the flat ABI. Zero means success.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Inverse of [`ErrorKind::code`].
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::DeviceQuery,
            2 => Self::Allocation,
            3 => Self::Free,
            4 => Self::Pool,
            5 => Self::Transfer,
            6 => Self::RandomGen,
            7 => Self::Event,
            8 => Self::Stream,
            9 => Self::InvalidConfig,
            10 => Self::BackendUnavailable,
            _ => return None,
        })
    }

    /// Short label used in logs and CLI output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::DeviceQuery => "DeviceQueryError",
            Self::Allocation => "AllocationError",
            Self::Free => "FreeError",
            Self::Pool => "PoolError",
            Self::Transfer => "TransferError",
            Self::RandomGen => "RandomGenError",
            Self::Event => "EventError",
            Self::Stream => "StreamError",
            Self::InvalidConfig => "InvalidConfig",
            Self::BackendUnavailable => "BackendUnavailable",
        }
    }
}

impl AccelError {
    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceQuery(_) => ErrorKind::DeviceQuery,
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::Free { .. } => ErrorKind::Free,
            Self::Pool(_) => ErrorKind::Pool,
            Self::Transfer(_) => ErrorKind::Transfer,
            Self::RandomGen(_) => ErrorKind::RandomGen,
            Self::Event(_) => ErrorKind::Event,
            Self::Stream(_) => ErrorKind::Stream,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
        }
    }
}

impl From<config::ConfigError> for AccelError {
    fn from(e: config::ConfigError) -> Self {
        AccelError::InvalidConfig(e.to_string())
    }
}
