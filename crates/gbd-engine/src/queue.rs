use std::collections::VecDeque;
use std::sync::Mutex;

/// A mutex-guarded FIFO shared between the submitting side and the workers
/// (for the job queue) or between the workers and the polling side (for the
/// result queue). Non-blocking on the read side by design: callers that
/// find it empty decide for themselves whether to sleep, spin, or give up.
pub struct Queue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> Queue<T> {
    /// An empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Push an item to the back of the queue.
    pub fn push(&self, item: T) {
        self.inner.lock().expect("queue mutex poisoned").push_back(item);
    }

    /// Pop the item at the front of the queue, if any, without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().expect("queue mutex poisoned").pop_front()
    }

    /// True if the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("queue mutex poisoned").is_empty()
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").len()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}
