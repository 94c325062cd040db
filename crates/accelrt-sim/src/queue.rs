//! Per-stream operation logs.
//!
//! Each stream is an append-only log with a completion cursor. Enqueueing
//! appends; a join drains everything between the cursor and the tail in
//! issue order. Nothing runs until a join, so an `_async` call that returned
//! has only been recorded.

use std::collections::{BTreeMap, VecDeque};

use accelrt_core::error::{AccelError, Result};
use accelrt_core::memory::{DevicePtr, EventHandle, MemcpyKind, StreamHandle};

/// A recorded unit of stream work.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Return a block to the pool cache.
    Free {
        /// Block base.
        ptr: DevicePtr,
    },
    /// Byte fill of device memory.
    Memset {
        /// Destination address.
        dst: u64,
        /// Length in bytes.
        bytes: u64,
        /// Fill byte.
        value: u8,
    },
    /// Copy between any pair of memory spaces.
    Memcpy {
        /// Source address.
        src: u64,
        /// Destination address.
        dst: u64,
        /// Length in bytes.
        bytes: u64,
        /// Direction the caller declared.
        kind: MemcpyKind,
    },
    /// Store a payload computed at enqueue time into device memory.
    Write {
        /// Destination address.
        dst: u64,
        /// Bytes to store.
        data: Vec<u8>,
    },
    /// Timeline marker for an event recording.
    Record {
        /// Event being recorded.
        event: EventHandle,
        /// Which recording of the event this marker belongs to.
        generation: u64,
    },
}

impl Op {
    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Op::Free { .. } => "free",
            Op::Memset { .. } => "memset",
            Op::Memcpy { .. } => "memcpy",
            Op::Write { .. } => "write",
            Op::Record { .. } => "record",
        }
    }

    /// Bytes the operation moves, used to advance the simulated clock.
    #[must_use]
    pub fn payload_bytes(&self) -> u64 {
        match self {
            Op::Memset { bytes, .. } | Op::Memcpy { bytes, .. } => *bytes,
            Op::Write { data, .. } => data.len() as u64,
            Op::Free { .. } | Op::Record { .. } => 0,
        }
    }
}

/// One stream's log.
#[derive(Debug, Default)]
pub struct StreamQueue {
    pending: VecDeque<Op>,
    submitted: u64,
    completed: u64,
}

impl StreamQueue {
    /// Append an operation.
    pub fn push(&mut self, op: Op) {
        self.pending.push_back(op);
        self.submitted += 1;
    }

    /// Remove every pending operation in issue order and advance the cursor.
    pub fn drain(&mut self) -> Vec<Op> {
        let ops: Vec<Op> = self.pending.drain(..).collect();
        self.completed += ops.len() as u64;
        ops
    }

    /// Operations recorded but not yet executed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Operations ever recorded.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Operations executed.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed
    }
}

/// All streams of the device, keyed by handle. The default stream always
/// exists and cannot be destroyed.
#[derive(Debug)]
pub struct StreamTable {
    queues: BTreeMap<u64, StreamQueue>,
    next_id: u64,
}

impl Default for StreamTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTable {
    /// Table holding only the default stream.
    #[must_use]
    pub fn new() -> Self {
        let mut queues = BTreeMap::new();
        queues.insert(StreamHandle::DEFAULT.as_raw(), StreamQueue::default());
        Self { queues, next_id: 1 }
    }

    /// Add a stream.
    pub fn create(&mut self) -> StreamHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.queues.insert(id, StreamQueue::default());
        StreamHandle::from_raw(id)
    }

    /// Remove a stream. It must be drained first.
    pub fn remove(&mut self, stream: StreamHandle) -> Result<StreamQueue> {
        if stream.is_default() {
            return Err(AccelError::Stream(
                "the default stream cannot be destroyed".to_string(),
            ));
        }
        self.queues
            .remove(&stream.as_raw())
            .ok_or_else(|| unknown_stream(stream))
    }

    /// Whether `stream` exists.
    #[must_use]
    pub fn contains(&self, stream: StreamHandle) -> bool {
        self.queues.contains_key(&stream.as_raw())
    }

    /// Queue of `stream`.
    pub fn get(&self, stream: StreamHandle) -> Result<&StreamQueue> {
        self.queues
            .get(&stream.as_raw())
            .ok_or_else(|| unknown_stream(stream))
    }

    /// Mutable queue of `stream`.
    pub fn get_mut(&mut self, stream: StreamHandle) -> Result<&mut StreamQueue> {
        self.queues
            .get_mut(&stream.as_raw())
            .ok_or_else(|| unknown_stream(stream))
    }

    /// Handles of every live stream, default first.
    #[must_use]
    pub fn handles(&self) -> Vec<StreamHandle> {
        self.queues.keys().map(|&id| StreamHandle::from_raw(id)).collect()
    }

    /// Pending operations across all streams.
    #[must_use]
    pub fn total_pending(&self) -> usize {
        self.queues.values().map(StreamQueue::pending).sum()
    }
}

fn unknown_stream(stream: StreamHandle) -> AccelError {
    AccelError::Stream(format!("unknown stream {:#x}", stream.as_raw()))
}
