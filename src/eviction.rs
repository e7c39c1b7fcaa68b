//! Idle eviction and abandoned-borrow reclamation

use crate::metrics::MetricsTracker;
use crate::pool::PoolInner;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread::{self, JoinHandle};

/// Outcome of one eviction sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Idle objects destroyed for exceeding the idle timeout
    pub idle_evicted: usize,

    /// Borrowed objects reclaimed for exceeding the abandoned timeout
    pub abandoned_reclaimed: usize,
}

impl<T> PoolInner<T> {
    /// Evicts from the idle end of the free-list while candidates are
    /// stale, stopping at the first one that is not: entries age
    /// monotonically towards that end. Finishes with abandoned reclamation.
    pub(crate) fn evict(&self) -> EvictionReport {
        let config = self.config();
        let mut idle_evicted = 0;

        if let Some(idle_timeout) = config.idle_timeout {
            while let Some(entry) =
                self.free
                    .take_evictable(config.order_policy, config.min_free, idle_timeout)
            {
                if entry.destroy() {
                    self.teardown(&entry);
                    MetricsTracker::increment(&self.metrics.idle_evicted);
                    idle_evicted += 1;
                }
            }
        }

        let abandoned_reclaimed = self.remove_abandoned();
        if idle_evicted > 0 || abandoned_reclaimed > 0 {
            tracing::debug!(idle_evicted, abandoned_reclaimed, "eviction sweep");
        }
        EvictionReport {
            idle_evicted,
            abandoned_reclaimed,
        }
    }

    /// Destroys borrowed entries unused for longer than the abandoned
    /// timeout. Each entry is flipped under its own lock first; the
    /// factory teardown runs afterwards over the collected batch.
    ///
    /// The borrower may still hold the object. Its `Arc` stays valid, but
    /// the factory's destroy hook has already run on it.
    pub(crate) fn remove_abandoned(&self) -> usize {
        let Some(timeout) = self.config().abandoned_timeout else {
            return 0;
        };

        let abandoned: Vec<_> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|entry| entry.destroy_if_abandoned(timeout))
            .collect();

        for entry in &abandoned {
            tracing::warn!(
                borrowed_for = ?entry.last_borrow_at().elapsed(),
                "reclaiming abandoned object"
            );
            self.teardown(entry);
            MetricsTracker::increment(&self.metrics.abandoned_reclaimed);
        }
        abandoned.len()
    }
}

/// Background thread running `evict` every `eviction_interval`.
///
/// The thread holds only a weak pool reference and exits when the pool is
/// gone, when the interval is switched off, or when stopped.
pub(crate) struct Evictor {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Evictor {
    pub fn spawn<T: Send + Sync + 'static>(pool: Weak<PoolInner<T>>) -> std::io::Result<Self> {
        let (stop, stopped) = channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("borrowpool-evictor".to_string())
            .spawn(move || {
                loop {
                    let interval = match pool.upgrade() {
                        Some(pool) if !pool.is_closed() => pool.config().eviction_interval,
                        _ => return,
                    };
                    let Some(interval) = interval else {
                        tracing::debug!("eviction disabled, evictor exiting");
                        return;
                    };
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Some(pool) = pool.upgrade() {
                                pool.evict();
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Signals the thread and waits for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            // The last pool handle can be dropped on the evictor thread itself
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Evictor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use crate::{ObjectPool, OrderPolicy, PoolConfiguration};
    use std::thread;
    use std::time::Duration;

    fn config() -> PoolConfiguration {
        PoolConfiguration::new()
            .with_max_total(8)
            .with_max_free(8)
            .with_min_free(0)
    }

    #[test]
    fn evicts_idle_beyond_timeout() {
        let pool = ObjectPool::from_fn(|| 0u8, config().with_idle_timeout(Duration::from_millis(20))).unwrap();
        pool.add_object().unwrap();
        pool.add_object().unwrap();

        assert_eq!(pool.evict().idle_evicted, 0);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(pool.evict().idle_evicted, 2);
        assert_eq!(pool.total_count(), 0);
    }

    #[test]
    fn eviction_keeps_min_free() {
        let pool = ObjectPool::from_fn(
            || 0u8,
            config().with_min_free(2).with_idle_timeout(Duration::from_millis(1)),
        )
        .unwrap();
        for _ in 0..5 {
            pool.add_object().unwrap();
        }
        thread::sleep(Duration::from_millis(10));

        assert_eq!(pool.evict().idle_evicted, 3);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn eviction_stops_at_first_young_entry() {
        for policy in [OrderPolicy::Lifo, OrderPolicy::Fifo] {
            let pool = ObjectPool::from_fn(
                || 0u8,
                config()
                    .with_order_policy(policy)
                    .with_idle_timeout(Duration::from_millis(40)),
            )
            .unwrap();
            let old = pool.borrow_object().unwrap();
            let young = pool.borrow_object().unwrap();

            pool.return_object(&old).unwrap();
            thread::sleep(Duration::from_millis(60));
            pool.return_object(&young).unwrap();

            assert_eq!(pool.evict().idle_evicted, 1, "{policy:?}");
            let left = pool.borrow_object().unwrap();
            assert!(std::sync::Arc::ptr_eq(&left, &young), "{policy:?}");
        }
    }

    #[test]
    fn reclaims_abandoned_borrow() {
        let pool = ObjectPool::from_fn(
            || 0u8,
            config().with_abandoned_timeout(Duration::from_millis(20)),
        )
        .unwrap();
        let leaked = pool.borrow_object().unwrap();
        let kept = pool.borrow_object().unwrap();

        thread::sleep(Duration::from_millis(40));
        pool.touch_object(&kept).unwrap();

        let report = pool.evict();
        assert_eq!(report.abandoned_reclaimed, 1);
        assert_eq!(pool.total_count(), 1);
        assert!(pool.return_object(&leaked).is_err());
        assert!(pool.return_object(&kept).is_ok());
    }

    #[test]
    fn background_evictor_runs_and_stops_on_close() {
        let pool = ObjectPool::from_fn(
            || 0u8,
            config()
                .with_idle_timeout(Duration::from_millis(10))
                .with_eviction_interval(Duration::from_millis(10)),
        )
        .unwrap();
        pool.add_object().unwrap();

        let mut waited = Duration::ZERO;
        while pool.free_count() > 0 && waited < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(10));
            waited += Duration::from_millis(10);
        }
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.get_metrics().idle_evicted, 1);

        pool.close();
    }

    #[test]
    fn evictor_started_by_reconfiguration() {
        let pool = ObjectPool::from_fn(|| 0u8, config()).unwrap();
        pool.add_object().unwrap();
        pool.update_configuration(|c| {
            c.with_idle_timeout(Duration::from_millis(5))
                .with_eviction_interval(Duration::from_millis(5))
        })
        .unwrap();

        let mut waited = Duration::ZERO;
        while pool.free_count() > 0 && waited < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
            waited += Duration::from_millis(5);
        }
        assert_eq!(pool.free_count(), 0);
    }
}
