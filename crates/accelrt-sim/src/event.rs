//! Timing events on the simulated device clock.
//!
//! Each recording bumps the event's generation. A queued marker only
//! completes the event if its generation is still current, so re-recording
//! discards whatever the earlier marker would have reported.

use std::collections::HashMap;

use tracing::debug;

use accelrt_core::error::{AccelError, Result};
use accelrt_core::memory::{EventHandle, StreamHandle};

/// Recording state of an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventState {
    /// Created, never recorded.
    Created,
    /// Marker queued, not yet reached.
    Pending {
        /// Generation of the queued marker.
        generation: u64,
        /// Stream the marker was placed on.
        stream: StreamHandle,
    },
    /// Marker reached.
    Completed {
        /// Generation that completed.
        generation: u64,
        /// Simulated device time in milliseconds.
        at_ms: f64,
    },
}

#[derive(Debug)]
struct EventSlot {
    generation: u64,
    state: EventState,
}

/// Live events, keyed by handle.
#[derive(Debug)]
pub struct EventTable {
    slots: HashMap<u64, EventSlot>,
    next_id: u64,
}

impl Default for EventTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EventTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            next_id: 1,
        }
    }

    /// Number of live events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no live events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Create an event.
    pub fn create(&mut self) -> EventHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.insert(
            id,
            EventSlot {
                generation: 0,
                state: EventState::Created,
            },
        );
        EventHandle::from_raw(id)
    }

    /// Destroy an event. Markers still queued for it become no-ops.
    pub fn destroy(&mut self, event: EventHandle) -> Result<()> {
        self.slots
            .remove(&event.as_raw())
            .map(|_| ())
            .ok_or_else(|| unknown_event(event))
    }

    /// Start a new recording on `stream`; returns the generation to queue.
    pub fn begin_record(&mut self, event: EventHandle, stream: StreamHandle) -> Result<u64> {
        let slot = self
            .slots
            .get_mut(&event.as_raw())
            .ok_or_else(|| unknown_event(event))?;
        slot.generation += 1;
        slot.state = EventState::Pending {
            generation: slot.generation,
            stream,
        };
        Ok(slot.generation)
    }

    /// Called when a queued marker is reached. Stale markers are ignored.
    pub fn complete(&mut self, event: EventHandle, generation: u64, at_ms: f64) -> bool {
        match self.slots.get_mut(&event.as_raw()) {
            Some(slot) if slot.generation == generation => {
                slot.state = EventState::Completed { generation, at_ms };
                true
            }
            Some(_) => {
                debug!(event = event.as_raw(), generation, "Superseded marker reached");
                false
            }
            None => {
                debug!(event = event.as_raw(), "Marker reached for destroyed event");
                false
            }
        }
    }

    /// Current state of `event`.
    pub fn state(&self, event: EventHandle) -> Result<EventState> {
        self.slots
            .get(&event.as_raw())
            .map(|s| s.state)
            .ok_or_else(|| unknown_event(event))
    }

    /// Milliseconds from `start` to `end`; both must have completed.
    pub fn elapsed_ms(&self, start: EventHandle, end: EventHandle) -> Result<f32> {
        let t0 = self.completed_at(start)?;
        let t1 = self.completed_at(end)?;
        Ok((t1 - t0) as f32)
    }

    fn completed_at(&self, event: EventHandle) -> Result<f64> {
        match self.state(event)? {
            EventState::Completed { at_ms, .. } => Ok(at_ms),
            EventState::Created => Err(AccelError::Event(format!(
                "event {:#x} has not been recorded",
                event.as_raw()
            ))),
            EventState::Pending { stream, .. } => Err(AccelError::Event(format!(
                "event {:#x} has not completed on stream {:#x}",
                event.as_raw(),
                stream.as_raw()
            ))),
        }
    }
}

fn unknown_event(event: EventHandle) -> AccelError {
    AccelError::Event(format!("unknown event {:#x}", event.as_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_lifecycle() {
        let mut table = EventTable::new();
        let e = table.create();
        assert_eq!(table.state(e).unwrap(), EventState::Created);

        let g = table.begin_record(e, StreamHandle::DEFAULT).unwrap();
        assert!(matches!(table.state(e).unwrap(), EventState::Pending { .. }));
        assert!(table.complete(e, g, 1.5));
        assert_eq!(
            table.state(e).unwrap(),
            EventState::Completed {
                generation: g,
                at_ms: 1.5
            }
        );

        table.destroy(e).unwrap();
        assert!(table.is_empty());
        assert!(table.destroy(e).is_err());
    }

    #[test]
    fn test_elapsed_requires_completion() {
        let mut table = EventTable::new();
        let a = table.create();
        let b = table.create();

        let err = table.elapsed_ms(a, b).unwrap_err();
        assert!(matches!(err, AccelError::Event(_)));

        let ga = table.begin_record(a, StreamHandle::DEFAULT).unwrap();
        table.begin_record(b, StreamHandle::DEFAULT).unwrap();
        table.complete(a, ga, 2.0);
        assert!(table.elapsed_ms(a, b).is_err());
    }

    #[test]
    fn test_rerecord_supersedes_old_marker() {
        let mut table = EventTable::new();
        let a = table.create();
        let b = table.create();

        let old = table.begin_record(a, StreamHandle::DEFAULT).unwrap();
        let gb = table.begin_record(b, StreamHandle::DEFAULT).unwrap();
        let new = table.begin_record(a, StreamHandle::DEFAULT).unwrap();
        assert!(new > old);

        // The superseded marker is reached first and must not count.
        assert!(!table.complete(a, old, 1.0));
        assert!(table.complete(a, new, 4.0));
        assert!(table.complete(b, gb, 10.0));
        assert_eq!(table.elapsed_ms(a, b).unwrap(), 6.0);
    }

    #[test]
    fn test_marker_for_destroyed_event() {
        let mut table = EventTable::new();
        let e = table.create();
        let g = table.begin_record(e, StreamHandle::DEFAULT).unwrap();
        table.destroy(e).unwrap();
        assert!(!table.complete(e, g, 1.0));
        assert_eq!(table.len(), 0);
    }
}
