//! Event Buffer - bounded in-memory holding area
//!
//! Events stay here until a delivery is confirmed or they are moved to the
//! persistent cache. Reaching capacity evicts the live contents to the
//! cache before the new event is appended, so nothing is ever rejected.
//!
//! Content replayed from the cache sits in front of the live events. It is
//! already durable, so it neither counts toward capacity nor gets evicted.

use super::event::Event;
use crate::logic::error::TelemetryResult;

/// Position of a snapshot, used to drop exactly what a delivery covered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    generation: u64,
    replayed: usize,
    next_seq: u64,
}

impl Watermark {
    /// Replayed cache events included in the snapshot
    pub fn replayed(&self) -> usize {
        self.replayed
    }
}

/// Insertion-ordered buffer with a capacity threshold
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<Event>,
    max_count: usize,
    /// Leading events that were replayed from the cache and are still stored there
    replayed: usize,
    /// Bumped whenever the whole buffer is dropped without being delivered
    generation: u64,
    /// Arrival number of the first live event (`events[replayed]`)
    first_seq: u64,
}

impl EventBuffer {
    pub fn new(max_count: usize) -> Self {
        Self {
            events: Vec::new(),
            max_count,
            replayed: 0,
            generation: 0,
            first_seq: 0,
        }
    }

    /// Append an event, evicting the live events to the cache first when full.
    ///
    /// `evict` receives only the events not already held by the cache. When
    /// it fails the contents are kept (the buffer overshoots its capacity)
    /// and the error is returned; the event is appended either way.
    /// Returns how many events were evicted.
    pub fn enqueue<F>(&mut self, event: Event, evict: F) -> TelemetryResult<usize>
    where
        F: FnOnce(&[Event]) -> TelemetryResult<()>,
    {
        let mut evicted = 0;

        if self.live_count() >= self.max_count {
            if let Err(e) = evict(self.unpersisted()) {
                self.events.push(event);
                return Err(e);
            }
            evicted = self.live_count();
            self.drop_live(evicted);
        }

        self.events.push(event);
        Ok(evicted)
    }

    /// Ordered copy of the current contents
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.clone()
    }

    /// Marks the current end of the buffer, pair it with [`EventBuffer::snapshot`]
    pub fn watermark(&self) -> Watermark {
        Watermark {
            generation: self.generation,
            replayed: self.replayed,
            next_seq: self.first_seq + self.live_count() as u64,
        }
    }

    pub fn clear(&mut self) {
        self.first_seq += self.live_count() as u64;
        self.events.clear();
        self.replayed = 0;
        self.generation += 1;
    }

    pub fn count(&self) -> usize {
        self.events.len()
    }

    /// Events tracked by the host that are not mirrored by the cache
    fn live_count(&self) -> usize {
        self.events.len() - self.replayed
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of leading events that mirror the cache contents
    pub fn replayed_count(&self) -> usize {
        self.replayed
    }

    /// Events that exist only in memory
    pub fn unpersisted(&self) -> &[Event] {
        &self.events[self.replayed..]
    }

    /// Place replayed cache content ahead of everything tracked so far.
    /// Cached batches are older than any live event.
    pub fn prepend_replayed(&mut self, replayed: Vec<Event>) {
        debug_assert_eq!(self.replayed, 0, "cache replayed twice");

        let count = replayed.len();
        self.events.splice(0..0, replayed);
        self.replayed = count;
    }

    /// Drop what a confirmed delivery covered.
    ///
    /// Live events that were evicted in the meantime are already gone, and
    /// after a full clear nothing is removed. Returns the number dropped.
    pub fn remove_delivered(&mut self, mark: Watermark) -> usize {
        if mark.generation != self.generation {
            return 0;
        }

        let replayed = mark.replayed.min(self.replayed);
        self.events.drain(..replayed);
        self.replayed -= replayed;

        let live = mark
            .next_seq
            .saturating_sub(self.first_seq)
            .min(self.live_count() as u64) as usize;
        self.drop_live(live);

        replayed + live
    }

    /// Remove the `count` oldest live events
    fn drop_live(&mut self, count: usize) {
        let start = self.replayed;
        self.events.drain(start..start + count);
        self.first_seq += count as u64;
    }
}
