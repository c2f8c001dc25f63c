//! Bounded handoff between the receive thread and the reader.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Result of [`DeliveryQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Accepted,
    /// The queue was full; the oldest chunk was evicted to make room.
    Evicted,
    /// The queue is closed; the chunk was discarded.
    Closed,
}

/// Result of [`DeliveryQueue::pop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pop<T> {
    Chunk(T),
    /// Nothing arrived within the timeout.
    Empty,
    /// Closed and nothing left to hand out.
    Closed,
}

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity FIFO between the receive thread and the reader.
///
/// `push` never blocks beyond the lock: when full, the oldest chunk is
/// evicted (live data is worthless once stale). `pop` waits on a condvar
/// up to its timeout and wakes immediately on [`close`](Self::close).
#[derive(Debug)]
pub struct DeliveryQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
    capacity: usize,
}

impl<T> DeliveryQueue<T> {
    /// Create a queue holding at most `capacity` chunks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, chunk: T) -> Push {
        let mut state = self.state.lock();
        if state.closed {
            return Push::Closed;
        }
        let outcome = if state.items.len() >= self.capacity {
            state.items.pop_front();
            Push::Evicted
        } else {
            Push::Accepted
        };
        state.items.push_back(chunk);
        drop(state);
        self.ready.notify_one();
        outcome
    }

    /// Take the oldest chunk, waiting up to `timeout` for one to arrive.
    ///
    /// Chunks still queued when the producer [`finish`](Self::finish)es are
    /// handed out before `Closed` is reported.
    pub fn pop(&self, timeout: Duration) -> Pop<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(chunk) = state.items.pop_front() {
                return Pop::Chunk(chunk);
            }
            if state.closed {
                return Pop::Closed;
            }
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return match state.items.pop_front() {
                    Some(chunk) => Pop::Chunk(chunk),
                    None if state.closed => Pop::Closed,
                    None => Pop::Empty,
                };
            }
        }
    }

    /// Producer is done: refuse new chunks but keep queued ones readable.
    pub fn finish(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    /// Refuse new chunks, discard queued ones and wake every waiter.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.items.clear();
        drop(state);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
