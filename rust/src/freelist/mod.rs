use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

// State guarded by the free list's lock.
struct Inner<T> {
    queue: VecDeque<T>,
    // bumped by interrupt(); a blocking pop whose epoch no longer matches
    // gives up.
    interrupts: u64,
}

// A FreeList is a FIFO of items available for lending, with its own lock and
// wait condition. Two free lists never share a lock.
pub struct FreeList<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> FreeList<T> {
    pub fn new() -> FreeList<T> {
        FreeList {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                interrupts: 0,
            }),
            available: Condvar::new(),
        }
    }

    // Builds a free list already holding `items`, front first.
    pub fn from_items<I>(items: I) -> FreeList<T>
    where
        I: IntoIterator<Item = T>,
    {
        let list = FreeList::new();
        list.inner.lock().queue.extend(items);
        list
    }

    // Removes and returns the front item, or None right away if the list is empty.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().queue.pop_front()
    }

    // Current interrupt epoch. Pass it to a later blocking pop so that an
    // interrupt issued in between still cancels that pop.
    pub fn epoch(&self) -> u64 {
        self.inner.lock().interrupts
    }

    /// Removes and returns the front item, waiting for a push if the list is
    /// empty. Returns `None` if [`FreeList::interrupt`] has been called since
    /// `since` was read from [`FreeList::epoch`], whether before or during
    /// the wait.
    ///
    /// A wake-up that finds the list empty again (another thread popped first)
    /// goes back to waiting rather than returning.
    pub fn blocking_pop(&self, since: u64) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if inner.interrupts != since {
                return None;
            }
            if let Some(item) = inner.queue.pop_front() {
                return Some(item);
            }
            self.available.wait(&mut inner);
        }
    }

    /// Like [`FreeList::blocking_pop`], but gives up and returns `None` once
    /// `timeout` has elapsed.
    pub fn blocking_pop_timeout(&self, timeout: Duration, since: u64) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.interrupts != since {
                return None;
            }
            if let Some(item) = inner.queue.pop_front() {
                return Some(item);
            }
            if self.available.wait_until(&mut inner, deadline).timed_out() {
                // one last look, a push may have raced the deadline
                if inner.interrupts != since {
                    return None;
                }
                return inner.queue.pop_front();
            }
        }
    }

    // Appends to the tail and wakes at most one waiter.
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock();
        inner.queue.push_back(item);
        self.available.notify_one();
    }

    // Wakes every thread currently waiting in a blocking pop; they return None.
    // Returns how many waiters were woken.
    pub fn interrupt(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.interrupts = inner.interrupts.wrapping_add(1);
        self.available.notify_all()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }
}

impl<T> Default for FreeList<T> {
    fn default() -> Self {
        Self::new()
    }
}
