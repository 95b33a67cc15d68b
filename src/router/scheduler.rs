//! Tick-driven timer queue for delayed and periodic receivers.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use hashbrown::HashMap;

use crate::endpoint::{Location, Tick};

/// A timer handed back to the router once its tick is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired {
    /// Receiver the timer belongs to.
    pub location: Location,
    /// Tick the timer was scheduled for.
    pub fire_at: Tick,
}

#[derive(Debug)]
struct Entry {
    fire_at: Tick,
    seq: u64,
    location: Location,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so the max-heap yields the earliest tick, then the earliest
    // scheduled.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.fire_at, other.seq).cmp(&(self.fire_at, self.seq))
    }
}

/// Priority queue of at most one live timer per location.
///
/// Rescheduling or cancelling leaves the superseded entry in the heap; it is
/// recognised as stale by its sequence number and discarded when popped.
#[derive(Debug, Default)]
pub struct TickScheduler {
    heap: BinaryHeap<Entry>,
    live: HashMap<Location, u64>,
    next_seq: u64,
}

impl TickScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `location` to fire at `fire_at`, replacing any pending timer.
    pub fn schedule(&mut self, location: Location, fire_at: Tick) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(location.clone(), seq);
        self.heap.push(Entry {
            fire_at,
            seq,
            location,
        });
    }

    /// Drops the pending timer for `location`, if any.
    pub fn cancel(&mut self, location: &Location) {
        self.live.remove(location);
    }

    /// Returns `true` when `location` has a pending timer.
    #[must_use]
    pub fn is_scheduled(&self, location: &Location) -> bool {
        self.live.contains_key(location)
    }

    /// Number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn discard_stale(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.live.get(&top.location) == Some(&top.seq) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Tick of the earliest pending timer.
    pub fn next_due(&mut self) -> Option<Tick> {
        self.discard_stale();
        self.heap.peek().map(|entry| entry.fire_at)
    }

    /// Removes and returns the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: Tick) -> Option<Fired> {
        self.discard_stale();
        if self.heap.peek()?.fire_at > now {
            return None;
        }
        let entry = self.heap.pop()?;
        self.live.remove(&entry.location);
        Some(Fired {
            location: entry.location,
            fire_at: entry.fire_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn at(x: i32) -> Location {
        Location::new("world", x, 0, 0)
    }

    #[fixture]
    fn scheduler() -> TickScheduler {
        TickScheduler::new()
    }

    fn drain(scheduler: &mut TickScheduler, now: Tick) -> Vec<Fired> {
        std::iter::from_fn(|| scheduler.pop_due(now)).collect()
    }

    #[rstest]
    fn timers_fire_in_tick_then_submission_order(mut scheduler: TickScheduler) {
        scheduler.schedule(at(2), 60);
        scheduler.schedule(at(0), 50);
        scheduler.schedule(at(1), 60);
        let fired: Vec<_> = drain(&mut scheduler, 100)
            .into_iter()
            .map(|f| (f.location.x, f.fire_at))
            .collect();
        assert_eq!(fired, vec![(0, 50), (2, 60), (1, 60)]);
        assert!(scheduler.is_empty());
    }

    #[rstest]
    fn rescheduling_replaces_pending_timer(mut scheduler: TickScheduler) {
        scheduler.schedule(at(0), 50);
        scheduler.schedule(at(0), 60);
        assert_eq!(scheduler.len(), 1);
        assert!(drain(&mut scheduler, 55).is_empty());
        assert_eq!(
            drain(&mut scheduler, 60),
            vec![Fired {
                location: at(0),
                fire_at: 60
            }]
        );
    }

    #[rstest]
    fn cancelled_timer_never_fires(mut scheduler: TickScheduler) {
        scheduler.schedule(at(0), 50);
        scheduler.cancel(&at(0));
        assert_eq!(scheduler.next_due(), None);
        assert!(drain(&mut scheduler, 1_000).is_empty());
    }

    #[rstest]
    fn future_timers_stay_queued(mut scheduler: TickScheduler) {
        scheduler.schedule(at(0), 50);
        assert_eq!(scheduler.pop_due(49), None);
        assert_eq!(scheduler.next_due(), Some(50));
        assert!(scheduler.is_scheduled(&at(0)));
    }
}
