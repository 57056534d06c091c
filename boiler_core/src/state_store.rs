//! `StateStore`: the single shared `SystemState`, gated by a mutex, with
//! an attached event ring buffer.
//!
//! The lock is never held across a module's `tick()` call — the Kernel
//! takes a snapshot, releases the lock, ticks every module against the
//! snapshot, then re-acquires the lock once to publish the merged
//! result. This keeps modules from blocking each other or the HTTP
//! boundary for the duration of a tick.

use crate::types::{Event, SystemState};
use std::collections::VecDeque;
use std::sync::Mutex;

struct Inner {
    state: SystemState,
    next_seq: u64,
    event_buf: VecDeque<(u64, Event)>,
    buf_capacity: usize,
}

pub struct StateStore {
    inner: Mutex<Inner>,
}

impl StateStore {
    pub fn new(initial: SystemState, event_buffer_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: initial,
                next_seq: 1,
                event_buf: VecDeque::with_capacity(event_buffer_capacity.min(4096)),
                buf_capacity: event_buffer_capacity.max(1),
            }),
        }
    }

    /// A deep copy of the current state, safe to read from any thread
    /// without holding the lock any longer than the copy takes.
    pub fn snapshot(&self) -> SystemState {
        let inner = self.inner.lock().expect("state store poisoned");
        inner.state.clone()
    }

    /// Run `f` against a mutable borrow of the state, lock held for the
    /// duration of the closure only.
    pub fn locked<R>(&self, f: impl FnOnce(&mut SystemState) -> R) -> R {
        let mut inner = self.inner.lock().expect("state store poisoned");
        f(&mut inner.state)
    }

    /// Assign each event the next sequence number (injected into
    /// `event.data["seq"]` and `event.seq`), push it onto the ring
    /// buffer, evicting the oldest entry once `buf_capacity` is
    /// exceeded.
    pub fn publish_events(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().expect("state store poisoned");
        for mut event in events {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            event.seq = Some(seq);
            event
                .data
                .insert("seq".to_string(), serde_json::Value::from(seq));
            inner.event_buf.push_back((seq, event));
            while inner.event_buf.len() > inner.buf_capacity {
                inner.event_buf.pop_front();
            }
        }
    }

    /// Events with `seq > last_seq`, the current newest sequence, and
    /// an overflow flag set when the ring has already dropped events
    /// the caller hasn't seen yet (`last_seq < oldest_seq - 1`).
    pub fn events_since(&self, last_seq: u64) -> (Vec<Event>, u64, bool) {
        let inner = self.inner.lock().expect("state store poisoned");
        let newest_seq = inner.next_seq.saturating_sub(1);
        let oldest_seq = inner.event_buf.front().map(|(s, _)| *s).unwrap_or(inner.next_seq);
        let overflow = last_seq < oldest_seq.saturating_sub(1) && !inner.event_buf.is_empty()
            || (last_seq == 0 && oldest_seq > 1);
        let events = inner
            .event_buf
            .iter()
            .filter(|(seq, _)| *seq > last_seq)
            .map(|(_, ev)| ev.clone())
            .collect();
        (events, newest_seq, overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventLevel;

    fn mk_event(n: u64) -> Event {
        Event::new(0.0, "test", EventLevel::Info, "X", format!("event {n}"))
    }

    #[test]
    fn sequence_numbers_are_strictly_increasing() {
        let store = StateStore::new(SystemState::default(), 1_000);
        store.publish_events(vec![mk_event(1), mk_event(2), mk_event(3)]);
        let (events, newest, overflow) = store.events_since(0);
        assert_eq!(events.len(), 3);
        assert_eq!(newest, 3);
        assert!(!overflow);
        assert_eq!(events[0].seq, Some(1));
        assert_eq!(events[2].seq, Some(3));
    }

    #[test]
    fn events_since_filters_strictly_greater() {
        let store = StateStore::new(SystemState::default(), 1_000);
        store.publish_events(vec![mk_event(1), mk_event(2), mk_event(3)]);
        let (events, newest, _) = store.events_since(2);
        assert_eq!(events.len(), 1);
        assert_eq!(newest, 3);
        assert_eq!(events[0].seq, Some(3));
    }

    #[test]
    fn scenario_s4_overflow_on_capacity_1000() {
        let store = StateStore::new(SystemState::default(), 1_000);
        let events: Vec<Event> = (0..1200).map(mk_event).collect();
        store.publish_events(events);

        let (returned, newest, overflow) = store.events_since(42);
        assert_eq!(newest, 1_200);
        assert!(overflow);
        assert_eq!(returned.len(), 1_000);
        assert_eq!(returned[0].seq, Some(201));
        assert_eq!(returned.last().unwrap().seq, Some(1_200));
    }

    #[test]
    fn no_overflow_when_nothing_dropped() {
        let store = StateStore::new(SystemState::default(), 1_000);
        store.publish_events(vec![mk_event(1), mk_event(2)]);
        let (_, _, overflow) = store.events_since(0);
        assert!(!overflow);
    }

    #[test]
    fn snapshot_is_independent_of_later_mutation() {
        let store = StateStore::new(SystemState::default(), 100);
        let snap1 = store.snapshot();
        store.locked(|s| s.ts_wall = 123.0);
        assert_eq!(snap1.ts_wall, 0.0);
        let snap2 = store.snapshot();
        assert_eq!(snap2.ts_wall, 123.0);
    }
}
