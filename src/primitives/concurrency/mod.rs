#![forbid(unsafe_code)]
//! Blocking hand-off primitives shared by every engine thread.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Multi-producer, multi-consumer FIFO of owned items.
///
/// Consumers drain the whole backlog at once so that lock traffic is amortized
/// across every item that arrived since the previous drain.
pub struct MessageQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    /// Appends one item, waking consumers if the queue was empty.
    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        let was_empty = items.is_empty();
        items.push_back(item);
        if was_empty {
            self.ready.notify_all();
        }
    }

    /// Appends a batch in iteration order under a single lock acquisition.
    pub fn push_batch<I>(&self, batch: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut items = self.items.lock();
        let was_empty = items.is_empty();
        items.extend(batch);
        if was_empty && !items.is_empty() {
            self.ready.notify_all();
        }
    }

    /// Blocks until the queue is non-empty, then moves its entire contents into `out`.
    ///
    /// Returns the number of items moved.
    pub fn pop_all(&self, out: &mut Vec<T>) -> usize {
        let mut items = self.items.lock();
        while items.is_empty() {
            self.ready.wait(&mut items);
        }
        Self::drain_into(&mut items, out)
    }

    /// Like [`MessageQueue::pop_all`] but gives up after `timeout`, returning 0.
    pub fn pop_all_timeout(&self, out: &mut Vec<T>, timeout: Duration) -> usize {
        let mut items = self.items.lock();
        if items.is_empty() {
            let _ = self.ready.wait_for(&mut items, timeout);
        }
        Self::drain_into(&mut items, out)
    }

    /// Drains whatever is queued without blocking.
    pub fn try_pop_all(&self, out: &mut Vec<T>) -> usize {
        let mut items = self.items.lock();
        Self::drain_into(&mut items, out)
    }

    /// Snapshot of the queued item count.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    fn drain_into(items: &mut VecDeque<T>, out: &mut Vec<T>) -> usize {
        let n = items.len();
        out.reserve(n);
        out.extend(items.drain(..));
        n
    }
}

/// A resettable one-shot signal: `wait` blocks until `open`, then re-arms.
///
/// Used for "start run" notifications where each arm triggers exactly one run.
#[derive(Default)]
pub struct Latch {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Latch {
    /// Creates a closed latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the latch and wakes the waiter.
    pub fn open(&self) {
        let mut open = self.open.lock();
        *open = true;
        self.cv.notify_all();
    }

    /// Blocks while the latch is closed, then closes it again and returns.
    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cv.wait(&mut open);
        }
        *open = false;
    }

    /// Bounded variant of [`Latch::wait`]; returns false on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut open = self.open.lock();
        if !*open {
            let _ = self.cv.wait_for(&mut open, timeout);
        }
        std::mem::replace(&mut *open, false)
    }
}
