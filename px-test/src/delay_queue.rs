//! Events released once simulated time reaches their due time.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

pub trait DelayQueue<E> {
    fn push(&mut self, event: E, delay: u64) -> &mut Self;

    fn now(&self) -> u64;

    /// Pops every due event, earliest first.
    fn trigger(&mut self) -> Option<Vec<(E, u64)>>;

    fn advance(&mut self, step: u64);
}

struct EventWithTick<E> {
    event: E,
    triggered_time: u64,
    // insertion order breaks ties
    seq: u64,
}

impl<E> EventWithTick<E> {
    fn key(&self) -> (u64, u64) {
        (self.triggered_time, self.seq)
    }
}

impl<E> PartialEq for EventWithTick<E> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<E> Eq for EventWithTick<E> {}

impl<E> PartialOrd for EventWithTick<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for EventWithTick<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

pub struct TickQueue<E> {
    now: u64,
    seq: u64,
    queue: BinaryHeap<Reverse<EventWithTick<E>>>,
}

impl<E> Default for TickQueue<E> {
    fn default() -> Self {
        Self {
            now: 0,
            seq: 0,
            queue: BinaryHeap::new(),
        }
    }
}

impl<E> DelayQueue<E> for TickQueue<E> {
    fn push(&mut self, event: E, delay: u64) -> &mut Self {
        self.seq += 1;
        self.queue.push(Reverse(EventWithTick {
            event,
            triggered_time: self.now + delay,
            seq: self.seq,
        }));
        self
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn trigger(&mut self) -> Option<Vec<(E, u64)>> {
        let mut events = Vec::new();
        while let Some(Reverse(e)) = self.queue.peek() {
            if e.triggered_time > self.now {
                break;
            }
            if let Some(Reverse(e)) = self.queue.pop() {
                events.push((e.event, e.triggered_time));
            }
        }
        if events.is_empty() {
            None
        } else {
            Some(events)
        }
    }

    #[inline]
    fn advance(&mut self, step: u64) {
        self.now += step;
    }
}

impl<E> TickQueue<E> {
    pub fn event_num(&self) -> usize {
        self.queue.len()
    }
}

#[test]
fn test_tick_queue() {
    let mut tq = TickQueue::default();
    tq.advance(10);
    tq.push("world!", 10).push("Hello, ", 5);
    assert_eq!(2, tq.event_num());

    tq.advance(5);
    assert_eq!(15, tq.now());
    assert_eq!(tq.trigger().unwrap(), vec![("Hello, ", 15)]);

    tq.advance(5);
    assert_eq!(tq.trigger().unwrap(), vec![("world!", 20)]);
    assert!(tq.trigger().is_none());
}

#[test]
fn test_ties_keep_push_order() {
    let mut tq = TickQueue::default();
    tq.push("a", 10).push("b", 300).push("c", 10);
    tq.advance(500);
    assert_eq!(
        vec![("a", 10), ("c", 10), ("b", 300)],
        tq.trigger().unwrap()
    );
}
