//! Ordered, blocking double-ended queue of idle entries

use crate::config::OrderPolicy;
use crate::entry::{EntryState, PooledEntry};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Slots<T> {
    entries: VecDeque<Arc<PooledEntry<T>>>,
    /// Bumped by `wake_all`, so a waiter that sampled it earlier notices
    /// a wakeup it would otherwise have missed.
    wakeups: u64,
}

/// Borrowers always take from the front. Returns go to the front under
/// LIFO and to the back under FIFO, so the least recently returned entry
/// sits at the back for LIFO and at the front for FIFO.
pub(crate) struct FreeList<T> {
    slots: Mutex<Slots<T>>,
    available: Condvar,
}

impl<T> FreeList<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                entries: VecDeque::new(),
                wakeups: 0,
            }),
            available: Condvar::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    /// Current wakeup generation, to be handed to `wait_pop`
    pub fn generation(&self) -> u64 {
        self.slots.lock().wakeups
    }

    pub fn pop(&self) -> Option<Arc<PooledEntry<T>>> {
        self.slots.lock().entries.pop_front()
    }

    /// Parks an entry unless the list already holds `max_free` entries or
    /// the entry is no longer free, in which case the entry is handed back.
    /// The state is checked under the list lock, so an entry destroyed
    /// concurrently is either refused here or removed again by its teardown.
    pub fn push(
        &self,
        entry: Arc<PooledEntry<T>>,
        policy: OrderPolicy,
        max_free: usize,
    ) -> Result<(), Arc<PooledEntry<T>>> {
        let mut slots = self.slots.lock();
        if slots.entries.len() >= max_free || entry.state() != EntryState::Free {
            return Err(entry);
        }
        match policy {
            OrderPolicy::Lifo => slots.entries.push_front(entry),
            OrderPolicy::Fifo => slots.entries.push_back(entry),
        }
        drop(slots);
        self.available.notify_one();
        Ok(())
    }

    /// Blocks until an entry shows up, `wake_all` is called after
    /// `generation` was sampled, or the deadline passes. `None` deadline
    /// waits without bound. Returns `None` on anything but an entry.
    pub fn wait_pop(
        &self,
        generation: u64,
        deadline: Option<Instant>,
    ) -> Option<Arc<PooledEntry<T>>> {
        let mut slots = self.slots.lock();
        loop {
            if let Some(entry) = slots.entries.pop_front() {
                return Some(entry);
            }
            if slots.wakeups != generation {
                return None;
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut slots, deadline).timed_out() {
                        return slots.entries.pop_front();
                    }
                }
                None => self.available.wait(&mut slots),
            }
        }
    }

    /// Wakes every blocked waiter without handing out an entry
    pub fn wake_all(&self) {
        self.slots.lock().wakeups += 1;
        self.available.notify_all();
    }

    pub fn remove(&self, entry: &Arc<PooledEntry<T>>) -> bool {
        let mut slots = self.slots.lock();
        match slots.entries.iter().position(|e| Arc::ptr_eq(e, entry)) {
            Some(index) => slots.entries.remove(index).is_some(),
            None => false,
        }
    }

    /// Takes the least recently returned entry if it may be evicted:
    /// the list is above `min_free` and the entry is free and idle past
    /// `idle_timeout`.
    pub fn take_evictable(
        &self,
        policy: OrderPolicy,
        min_free: usize,
        idle_timeout: Duration,
    ) -> Option<Arc<PooledEntry<T>>> {
        let mut slots = self.slots.lock();
        if slots.entries.len() <= min_free {
            return None;
        }
        let candidate = match policy {
            OrderPolicy::Lifo => slots.entries.back(),
            OrderPolicy::Fifo => slots.entries.front(),
        }?;
        if !candidate.is_evictable(idle_timeout) {
            return None;
        }
        match policy {
            OrderPolicy::Lifo => slots.entries.pop_back(),
            OrderPolicy::Fifo => slots.entries.pop_front(),
        }
    }

    pub fn drain(&self) -> Vec<Arc<PooledEntry<T>>> {
        self.slots.lock().entries.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn entry(value: u32) -> Arc<PooledEntry<u32>> {
        Arc::new(PooledEntry::new(value))
    }

    #[test]
    fn lifo_hands_out_latest_return() {
        let list = FreeList::new();
        list.push(entry(1), OrderPolicy::Lifo, 8).unwrap();
        list.push(entry(2), OrderPolicy::Lifo, 8).unwrap();
        assert_eq!(*list.pop().unwrap().object(), 2);
    }

    #[test]
    fn fifo_hands_out_oldest_return() {
        let list = FreeList::new();
        list.push(entry(1), OrderPolicy::Fifo, 8).unwrap();
        list.push(entry(2), OrderPolicy::Fifo, 8).unwrap();
        assert_eq!(*list.pop().unwrap().object(), 1);
    }

    #[test]
    fn push_refuses_beyond_max_free() {
        let list = FreeList::new();
        list.push(entry(1), OrderPolicy::Lifo, 1).unwrap();
        let rejected = list.push(entry(2), OrderPolicy::Lifo, 1).unwrap_err();
        assert_eq!(*rejected.object(), 2);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn wait_pop_times_out() {
        let list: FreeList<u32> = FreeList::new();
        let started = Instant::now();
        let generation = list.generation();
        let got = list.wait_pop(generation, Some(Instant::now() + Duration::from_millis(30)));
        assert!(got.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn wait_pop_receives_pushed_entry() {
        let list = Arc::new(FreeList::new());
        let generation = list.generation();

        let pusher = {
            let list = Arc::clone(&list);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                list.push(entry(9), OrderPolicy::Lifo, 8).unwrap();
            })
        };

        let got = list.wait_pop(generation, Some(Instant::now() + Duration::from_secs(5)));
        pusher.join().unwrap();
        assert_eq!(*got.unwrap().object(), 9);
    }

    #[test]
    fn push_refuses_destroyed_entry() {
        let list = FreeList::new();
        let destroyed = entry(3);
        destroyed.destroy();
        assert!(list.push(destroyed, OrderPolicy::Fifo, 8).is_err());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn stale_generation_returns_immediately() {
        let list: FreeList<u32> = FreeList::new();
        let generation = list.generation();
        list.wake_all();
        let started = Instant::now();
        assert!(list.wait_pop(generation, None).is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn eviction_respects_min_free_and_idle_end() {
        let list = FreeList::new();
        let old = entry(1);
        list.push(Arc::clone(&old), OrderPolicy::Lifo, 8).unwrap();
        thread::sleep(Duration::from_millis(20));
        list.push(entry(2), OrderPolicy::Lifo, 8).unwrap();

        assert!(
            list.take_evictable(OrderPolicy::Lifo, 2, Duration::ZERO)
                .is_none()
        );
        let evicted = list
            .take_evictable(OrderPolicy::Lifo, 1, Duration::from_millis(10))
            .unwrap();
        assert!(Arc::ptr_eq(&evicted, &old));
        assert!(
            list.take_evictable(OrderPolicy::Lifo, 0, Duration::from_secs(60))
                .is_none()
        );
    }

    #[test]
    fn remove_by_identity() {
        let list = FreeList::new();
        let a = entry(1);
        list.push(Arc::clone(&a), OrderPolicy::Fifo, 8).unwrap();
        list.push(entry(1), OrderPolicy::Fifo, 8).unwrap();

        assert!(list.remove(&a));
        assert!(!list.remove(&a));
        assert_eq!(list.len(), 1);
    }
}
