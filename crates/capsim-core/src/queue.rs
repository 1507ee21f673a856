//! Bounded priority queue of pending simulation events.
//!
//! Pop order is `(timestamp asc, priority desc, insertion seq asc)`:
//! time never runs backwards, same-timestamp events run system-first,
//! and equal keys preserve insertion order. Admission control on
//! overflow compares `(priority, -timestamp)`: a full queue only
//! accepts an event that is strictly better than the worst evictable
//! entry, and system events are never evicted.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use capsim_types::{EventId, SimEvent};

/// Errors from queue admission.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue is full and the event did not beat the worst entry.
    #[error("queue full (capacity {capacity}), event {kind} at t={timestamp} rejected")]
    Full {
        /// Configured capacity.
        capacity: usize,
        /// Kind of the rejected event.
        kind: &'static str,
        /// Timestamp of the rejected event.
        timestamp: f64,
    },

    /// Timestamps must be finite and non-negative.
    #[error("invalid event timestamp: {timestamp}")]
    InvalidTimestamp {
        /// The offending timestamp.
        timestamp: f64,
    },
}

/// An event admitted to the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    /// Unique event id (audit idempotence key).
    pub id: EventId,
    /// Sim-minute the event fires at.
    pub timestamp: f64,
    /// Queue priority, derived from the event kind.
    pub priority: u8,
    /// Insertion sequence number, tie-breaker of last resort.
    pub seq: u64,
    /// The payload.
    pub event: SimEvent,
}

/// Pop-order key. Timestamps are non-negative, so their bit patterns
/// order identically to their values.
type PopKey = (u64, Reverse<u8>, u64);

/// Bounded priority event queue.
#[derive(Debug, Default)]
pub struct EventQueue {
    entries: BTreeMap<PopKey, ScheduledEvent>,
    capacity: usize,
    next_seq: u64,
}

impl EventQueue {
    /// Create a queue with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Timestamp of the next event to pop, if any.
    pub fn peek_ts(&self) -> Option<f64> {
        self.entries.values().next().map(|e| e.timestamp)
    }

    /// Admit an event.
    ///
    /// Returns the evicted entry when admission displaced the worst
    /// pending event.
    ///
    /// # Errors
    ///
    /// [`QueueError::InvalidTimestamp`] for non-finite or negative
    /// timestamps; [`QueueError::Full`] when the queue is at capacity
    /// and the event does not strictly beat the worst evictable entry.
    pub fn push(
        &mut self,
        id: EventId,
        timestamp: f64,
        event: SimEvent,
    ) -> Result<Option<ScheduledEvent>, QueueError> {
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(QueueError::InvalidTimestamp { timestamp });
        }

        let priority = event.priority();
        let mut evicted = None;

        if self.entries.len() >= self.capacity {
            let worst_key = self.worst_evictable_key();
            let Some(worst_key) = worst_key else {
                // Everything pending is a system event.
                return Err(QueueError::Full {
                    capacity: self.capacity,
                    kind: event.kind(),
                    timestamp,
                });
            };
            let beats_worst = {
                let worst = &self.entries[&worst_key];
                (priority, Reverse(timestamp.to_bits()))
                    > (worst.priority, Reverse(worst.timestamp.to_bits()))
            };
            if !beats_worst {
                return Err(QueueError::Full {
                    capacity: self.capacity,
                    kind: event.kind(),
                    timestamp,
                });
            }
            evicted = self.entries.remove(&worst_key);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            (timestamp.to_bits(), Reverse(priority), seq),
            ScheduledEvent {
                id,
                timestamp,
                priority,
                seq,
                event,
            },
        );
        Ok(evicted)
    }

    /// Remove and return the next event in pop order.
    pub fn pop(&mut self) -> Option<ScheduledEvent> {
        let key = *self.entries.keys().next()?;
        self.entries.remove(&key)
    }

    /// Drop every pending event (shutdown: stop accepting work).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Key of the worst evictable (non-system) entry: lowest priority,
    /// then latest timestamp, then newest insertion.
    fn worst_evictable_key(&self) -> Option<PopKey> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.event.is_system())
            .min_by_key(|(_, e)| (e.priority, Reverse(e.timestamp.to_bits()), Reverse(e.seq)))
            .map(|(key, _)| *key)
    }
}
