//! Admission control for object creation

use crate::errors::{PoolError, PoolResult};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
struct Counts {
    /// Creation claims held: objects alive plus objects being created
    claimed: usize,
    /// Factory calls currently running
    in_flight: usize,
    closed: bool,
}

/// Bounds the number of live objects by `max_total`.
///
/// A caller over the bound waits only while some creation is in flight,
/// since that creation may fail and free its claim. With nothing in
/// flight the caller is denied and should wait on the free-list instead.
/// Every change of the counters wakes all waiters.
pub(crate) struct AdmissionGate {
    counts: Mutex<Counts>,
    changed: Condvar,
    created: AtomicU64,
}

/// A granted creation claim. Dropping it without calling `succeed`
/// gives the claim back, so a failing or panicking factory never leaks
/// capacity.
#[must_use]
pub(crate) struct CreationSlot<'a> {
    gate: &'a AdmissionGate,
    succeeded: bool,
}

impl CreationSlot<'_> {
    /// Keeps the claim for the newly created object
    pub fn succeed(mut self) {
        self.succeeded = true;
        self.gate.created.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for CreationSlot<'_> {
    fn drop(&mut self) {
        let mut counts = self.gate.counts.lock();
        counts.in_flight -= 1;
        if !self.succeeded {
            counts.claimed -= 1;
        }
        drop(counts);
        self.gate.changed.notify_all();
    }
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(Counts::default()),
            changed: Condvar::new(),
            created: AtomicU64::new(0),
        }
    }

    /// Claims a creation slot. `Ok(None)` means denied: the pool is full
    /// and no creation is in flight, or the deadline passed while waiting
    /// for one to resolve.
    pub fn admit(
        &self,
        max_total: Option<usize>,
        deadline: Option<Instant>,
    ) -> PoolResult<Option<CreationSlot<'_>>> {
        let mut counts = self.counts.lock();
        loop {
            if counts.closed {
                return Err(PoolError::Closed);
            }

            counts.claimed += 1;
            if !max_total.is_some_and(|max| counts.claimed > max) {
                counts.in_flight += 1;
                return Ok(Some(CreationSlot {
                    gate: self,
                    succeeded: false,
                }));
            }
            counts.claimed -= 1;

            if counts.in_flight == 0 {
                return Ok(None);
            }
            tracing::trace!(in_flight = counts.in_flight, "waiting for in-flight creation");
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    self.changed.wait_until(&mut counts, deadline);
                }
                None => self.changed.wait(&mut counts),
            }
        }
    }

    /// Gives back the claim of a destroyed object
    pub fn release(&self) {
        let mut counts = self.counts.lock();
        counts.claimed = counts.claimed.saturating_sub(1);
        drop(counts);
        self.changed.notify_all();
    }

    /// Refuses all further admissions and wakes every waiter
    pub fn close(&self) {
        self.counts.lock().closed = true;
        self.changed.notify_all();
    }

    pub fn claimed(&self) -> usize {
        self.counts.lock().claimed
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn admits_up_to_max_total() {
        let gate = AdmissionGate::new();
        for _ in 0..3 {
            gate.admit(Some(3), None).unwrap().unwrap().succeed();
        }
        assert!(gate.admit(Some(3), None).unwrap().is_none());
        assert_eq!(gate.claimed(), 3);
        assert_eq!(gate.created(), 3);
    }

    #[test]
    fn unbounded_always_admits() {
        let gate = AdmissionGate::new();
        for _ in 0..100 {
            gate.admit(None, None).unwrap().unwrap().succeed();
        }
        assert_eq!(gate.claimed(), 100);
    }

    #[test]
    fn failed_creation_returns_claim() {
        let gate = AdmissionGate::new();
        let slot = gate.admit(Some(1), None).unwrap().unwrap();
        drop(slot);
        assert_eq!(gate.claimed(), 0);
        assert_eq!(gate.created(), 0);
        assert!(gate.admit(Some(1), None).unwrap().is_some());
    }

    #[test]
    fn release_frees_capacity() {
        let gate = AdmissionGate::new();
        gate.admit(Some(1), None).unwrap().unwrap().succeed();
        assert!(gate.admit(Some(1), None).unwrap().is_none());
        gate.release();
        assert!(gate.admit(Some(1), None).unwrap().is_some());
    }

    #[test]
    fn closed_gate_refuses() {
        let gate = AdmissionGate::new();
        gate.close();
        assert_eq!(gate.admit(None, None).err(), Some(PoolError::Closed));
    }

    #[test]
    fn waiter_retries_when_in_flight_creation_fails() {
        let gate = Arc::new(AdmissionGate::new());
        let slot_taken = Arc::new(AtomicUsize::new(0));

        let creator = {
            let gate = Arc::clone(&gate);
            let slot_taken = Arc::clone(&slot_taken);
            thread::spawn(move || {
                let slot = gate.admit(Some(1), None).unwrap().unwrap();
                slot_taken.store(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                drop(slot);
            })
        };

        while slot_taken.load(Ordering::SeqCst) == 0 {
            thread::yield_now();
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        let slot = gate.admit(Some(1), Some(deadline)).unwrap();
        assert!(slot.is_some());
        creator.join().unwrap();
    }

    #[test]
    fn waiter_denied_after_deadline() {
        let gate = AdmissionGate::new();
        let _slot = gate.admit(Some(1), None).unwrap().unwrap();
        let started = Instant::now();
        let deadline = started + Duration::from_millis(30);
        assert!(gate.admit(Some(1), Some(deadline)).unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn claims_never_exceed_bound_under_contention() {
        let gate = Arc::new(AdmissionGate::new());
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let admitted = Arc::clone(&admitted);
                thread::spawn(move || {
                    let deadline = Instant::now() + Duration::from_millis(100);
                    if let Some(slot) = gate.admit(Some(4), Some(deadline)).unwrap() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                        assert!(gate.claimed() <= 4);
                        slot.succeed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 4);
        assert_eq!(gate.claimed(), 4);
    }
}
