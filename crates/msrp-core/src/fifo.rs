//! Blocking hand-off queue between socket threads and session logic.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct FifoState<T> {
    queue: VecDeque<T>,
    // Bumped by unblock_read so that every reader waiting at that point leaves
    generation: u64,
}

/// Unbounded FIFO with blocking reads
///
/// A read on an empty queue waits for [`put_message`](Self::put_message) or
/// [`unblock_read`](Self::unblock_read). An empty result is not an error: it
/// means the wait timed out or the reader was released.
pub struct FifoBuffer<T> {
    state: Mutex<FifoState<T>>,
    available: Condvar,
}

impl<T> Default for FifoBuffer<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(FifoState {
                queue: VecDeque::new(),
                generation: 0,
            }),
            available: Condvar::new(),
        }
    }
}

impl<T> FifoBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a message and wake one reader
    pub fn put_message(&self, message: T) {
        self.state.lock().queue.push_back(message);
        self.available.notify_one();
    }

    /// Wait until a message is available
    ///
    /// Returns `None` only when released by `unblock_read`.
    pub fn get_message(&self) -> Option<T> {
        let mut state = self.state.lock();
        let generation = state.generation;
        loop {
            if let Some(message) = state.queue.pop_front() {
                return Some(message);
            }
            if state.generation != generation {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Wait up to `timeout` for a message
    pub fn get_message_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let generation = state.generation;
        loop {
            if let Some(message) = state.queue.pop_front() {
                return Some(message);
            }
            if state.generation != generation {
                return None;
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return state.queue.pop_front();
            }
        }
    }

    /// Release every reader currently waiting, with or without a message
    pub fn unblock_read(&self) {
        self.state.lock().generation += 1;
        self.available.notify_all();
    }
}

impl<T> std::fmt::Debug for FifoBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoBuffer").field("len", &self.len()).finish()
    }
}
