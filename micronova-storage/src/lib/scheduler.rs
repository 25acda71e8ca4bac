use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Virtual time, in controller time units.
pub type Time = u64;

/// Who an event is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKey {
    Unit(usize),
    RotationTimer,
}

/// A discrete-event queue running in virtual time. Each key may have at
/// most one pending event; events with equal fire times are delivered in
/// the order they were scheduled.
#[derive(Debug, Default)]
pub struct Scheduler {
    now: Time,
    sequence: u64,
    queue: BinaryHeap<Reverse<(Time, u64, EventKey)>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current virtual time.
    pub fn now(&self) -> Time {
        self.now
    }

    /// Deliver an event to `key` after `delay` time units.
    pub fn schedule(&mut self, key: EventKey, delay: Time) {
        debug_assert!(!self.is_active(key), "{:?} already has a pending event", key);
        let entry = (self.now + delay, self.sequence, key);
        self.sequence += 1;
        self.queue.push(Reverse(entry));
    }

    /// Drop the pending event for `key`, returning whether there was one.
    pub fn cancel(&mut self, key: EventKey) -> bool {
        let before = self.queue.len();
        self.queue.retain(|Reverse((_, _, k))| *k != key);
        self.queue.len() != before
    }

    /// Does `key` have a pending event?
    pub fn is_active(&self, key: EventKey) -> bool {
        self.fire_time(key).is_some()
    }

    /// When the pending event for `key` will fire, if there is one.
    pub fn fire_time(&self, key: EventKey) -> Option<Time> {
        self.queue.iter()
            .find(|Reverse((_, _, k))| *k == key)
            .map(|Reverse((time, _, _))| *time)
    }

    /// When the earliest pending event will fire.
    pub fn next_fire_time(&self) -> Option<Time> {
        self.queue.peek().map(|Reverse((time, _, _))| *time)
    }

    /// Remove and return the next event due at or before `limit`, moving
    /// the clock forward to its fire time.
    pub fn pop_due(&mut self, limit: Time) -> Option<EventKey> {
        match self.queue.peek() {
            Some(Reverse((time, _, _))) if *time <= limit => {}
            _ => return None,
        }
        let Reverse((time, _, key)) = self.queue.pop()?;
        self.now = self.now.max(time);
        Some(key)
    }

    /// Move the clock forward to `time`. Never moves it backwards.
    pub fn advance_to(&mut self, time: Time) {
        self.now = self.now.max(time);
    }

    /// Drop every pending event.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_order() {
        let mut sched = Scheduler::new();
        sched.schedule(EventKey::Unit(1), 50);
        sched.schedule(EventKey::RotationTimer, 10);
        sched.schedule(EventKey::Unit(0), 50);

        assert_eq!(sched.pop_due(5), None);
        assert_eq!(sched.next_fire_time(), Some(10));
        assert_eq!(sched.pop_due(100), Some(EventKey::RotationTimer));
        assert_eq!(sched.now(), 10);
        // Equal fire times come out in scheduling order.
        assert_eq!(sched.pop_due(100), Some(EventKey::Unit(1)));
        assert_eq!(sched.pop_due(100), Some(EventKey::Unit(0)));
        assert_eq!(sched.now(), 50);
        assert_eq!(sched.pop_due(100), None);
    }

    #[test]
    fn test_cancel() {
        let mut sched = Scheduler::new();
        sched.schedule(EventKey::Unit(0), 5);
        sched.schedule(EventKey::Unit(1), 7);
        assert!(sched.is_active(EventKey::Unit(0)));
        assert_eq!(sched.fire_time(EventKey::Unit(1)), Some(7));

        assert!(sched.cancel(EventKey::Unit(0)));
        assert!(!sched.cancel(EventKey::Unit(0)));
        assert!(!sched.is_active(EventKey::Unit(0)));
        assert_eq!(sched.pop_due(10), Some(EventKey::Unit(1)));
    }

    #[test]
    fn test_delay_relative_to_now() {
        let mut sched = Scheduler::new();
        sched.advance_to(1000);
        sched.schedule(EventKey::Unit(2), 1);
        assert_eq!(sched.fire_time(EventKey::Unit(2)), Some(1001));
        sched.advance_to(10);
        assert_eq!(sched.now(), 1000);
    }
}
