//! Pooled entries and their lifecycle state machine

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle state of a pooled entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Idle on the free-list
    Free,

    /// Handed out to a borrower
    Used,

    /// On its way back, passivation in progress
    Returning,

    /// Torn down; terminal
    Destroyed,
}

#[derive(Debug)]
struct Lifecycle {
    state: EntryState,
    last_borrow_at: Instant,
    last_use_at: Instant,
    last_return_at: Instant,
}

/// A pool-owned wrapper around one managed object.
///
/// Every state change goes through the entry's own lock, so two threads
/// racing on the same entry never both win a transition while unrelated
/// entries never contend.
#[derive(Debug)]
pub struct PooledEntry<T> {
    object: Arc<T>,
    created_at: Instant,
    lifecycle: Mutex<Lifecycle>,
}

impl<T> PooledEntry<T> {
    pub(crate) fn new(object: T) -> Self {
        let now = Instant::now();
        Self {
            object: Arc::new(object),
            created_at: now,
            lifecycle: Mutex::new(Lifecycle {
                state: EntryState::Free,
                last_borrow_at: now,
                last_use_at: now,
                last_return_at: now,
            }),
        }
    }

    /// The managed object
    pub fn object(&self) -> &T {
        &self.object
    }

    pub(crate) fn shared(&self) -> &Arc<T> {
        &self.object
    }

    pub fn state(&self) -> EntryState {
        self.lifecycle.lock().state
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_borrow_at(&self) -> Instant {
        self.lifecycle.lock().last_borrow_at
    }

    pub fn last_use_at(&self) -> Instant {
        self.lifecycle.lock().last_use_at
    }

    pub fn last_return_at(&self) -> Instant {
        self.lifecycle.lock().last_return_at
    }

    /// Time spent on the free-list since the last return
    pub fn idle_time(&self) -> Duration {
        self.last_return_at().elapsed()
    }

    /// Free -> Used. Returns false if another thread got there first.
    pub(crate) fn use_entry(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != EntryState::Free {
            return false;
        }
        let now = Instant::now();
        lifecycle.state = EntryState::Used;
        lifecycle.last_borrow_at = now;
        lifecycle.last_use_at = now;
        true
    }

    /// Used -> Returning
    pub(crate) fn begin_return(&self) -> Result<(), EntryState> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != EntryState::Used {
            return Err(lifecycle.state);
        }
        lifecycle.state = EntryState::Returning;
        Ok(())
    }

    /// Used | Returning -> Free
    pub(crate) fn give_back(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            EntryState::Used | EntryState::Returning => {
                lifecycle.state = EntryState::Free;
                lifecycle.last_return_at = Instant::now();
                true
            }
            EntryState::Free | EntryState::Destroyed => false,
        }
    }

    /// Marks the entry destroyed. Only the call that performs the
    /// transition gets `true`; it owns the teardown.
    pub(crate) fn destroy(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        let first = lifecycle.state != EntryState::Destroyed;
        lifecycle.state = EntryState::Destroyed;
        first
    }

    /// Refreshes the last-use stamp of a borrowed entry
    pub(crate) fn touch(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != EntryState::Used {
            return false;
        }
        lifecycle.last_use_at = Instant::now();
        true
    }

    /// Destroys the entry if it is still borrowed and has gone unused
    /// for longer than `timeout`. Check and flip happen under one lock.
    pub(crate) fn destroy_if_abandoned(&self, timeout: Duration) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state == EntryState::Used && lifecycle.last_use_at.elapsed() > timeout {
            lifecycle.state = EntryState::Destroyed;
            return true;
        }
        false
    }

    /// Whether the evictor may take this entry: free and idle past `timeout`
    pub(crate) fn is_evictable(&self, timeout: Duration) -> bool {
        let lifecycle = self.lifecycle.lock();
        lifecycle.state == EntryState::Free && lifecycle.last_return_at.elapsed() > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn new_entry_is_free() {
        let entry = PooledEntry::new(7);
        assert_eq!(entry.state(), EntryState::Free);
        assert_eq!(*entry.object(), 7);
    }

    #[test]
    fn use_only_from_free() {
        let entry = PooledEntry::new(());
        assert!(entry.use_entry());
        assert_eq!(entry.state(), EntryState::Used);
        assert!(!entry.use_entry());
    }

    #[test]
    fn give_back_from_used_and_returning() {
        let entry = PooledEntry::new(());
        assert!(!entry.give_back());

        entry.use_entry();
        assert!(entry.give_back());
        assert_eq!(entry.state(), EntryState::Free);

        entry.use_entry();
        assert_eq!(entry.begin_return(), Ok(()));
        assert_eq!(entry.state(), EntryState::Returning);
        assert!(entry.give_back());
    }

    #[test]
    fn begin_return_reports_current_state() {
        let entry = PooledEntry::new(());
        assert_eq!(entry.begin_return(), Err(EntryState::Free));
        entry.use_entry();
        entry.begin_return().unwrap();
        assert_eq!(entry.begin_return(), Err(EntryState::Returning));
    }

    #[test]
    fn destroyed_is_terminal() {
        let entry = PooledEntry::new(());
        assert!(entry.destroy());
        assert!(!entry.destroy());
        assert!(!entry.use_entry());
        assert!(!entry.give_back());
        assert!(!entry.touch());
        assert_eq!(entry.state(), EntryState::Destroyed);
    }

    #[test]
    fn borrow_stamps_use_time() {
        let entry = PooledEntry::new(());
        let before = entry.last_use_at();
        thread::sleep(Duration::from_millis(2));
        entry.use_entry();
        assert!(entry.last_use_at() > before);
        assert_eq!(entry.last_use_at(), entry.last_borrow_at());
    }

    #[test]
    fn abandoned_only_after_timeout() {
        let entry = PooledEntry::new(());
        entry.use_entry();
        assert!(!entry.destroy_if_abandoned(Duration::from_secs(60)));
        thread::sleep(Duration::from_millis(5));
        assert!(entry.destroy_if_abandoned(Duration::from_millis(1)));
        assert_eq!(entry.state(), EntryState::Destroyed);
    }

    #[test]
    fn only_one_thread_wins_use() {
        let entry = Arc::new(PooledEntry::new(()));
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let entry = Arc::clone(&entry);
                let wins = Arc::clone(&wins);
                thread::spawn(move || {
                    if entry.use_entry() {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }
}
