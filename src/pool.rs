//! Core object pool implementation

use crate::admission::AdmissionGate;
use crate::config::PoolConfiguration;
use crate::entry::{EntryState, PooledEntry};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{EvictionReport, Evictor};
use crate::factory::{FnFactory, ObjectFactory};
use crate::free_list::FreeList;
use crate::health::HealthStatus;
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::registry::Registry;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A borrowed object that automatically returns to the pool when dropped
pub struct PooledObject<T: Send + Sync + 'static> {
    object: Option<Arc<T>>,
    pool: ObjectPool<T>,
}

impl<T: Send + Sync + 'static> PooledObject<T> {
    fn new(object: Arc<T>, pool: ObjectPool<T>) -> Self {
        Self {
            object: Some(object),
            pool,
        }
    }

    /// The shared handle the pool tracks this object by
    pub fn shared(&self) -> &Arc<T> {
        self.object.as_ref().expect("object already released")
    }

    /// Mark the object as still in use, postponing abandoned reclamation
    pub fn touch(&self) -> PoolResult<()> {
        self.pool.touch_object(self.shared())
    }

    /// Destroy the object instead of returning it
    pub fn invalidate(mut self) -> PoolResult<()> {
        match self.object.take() {
            Some(object) => self.pool.destroy_object(&object),
            None => Ok(()),
        }
    }
}

impl<T: Send + Sync + 'static> Deref for PooledObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.shared()
    }
}

impl<T: Send + Sync + 'static> Drop for PooledObject<T> {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            if let Err(err) = self.pool.return_object(&object) {
                tracing::warn!(error = %err, "pooled object could not be returned");
            }
        }
    }
}

pub(crate) struct PoolInner<T> {
    pub(crate) factory: Box<dyn ObjectFactory<T>>,
    pub(crate) config: ArcSwap<PoolConfiguration>,
    pub(crate) registry: Registry<T>,
    pub(crate) free: FreeList<T>,
    pub(crate) gate: AdmissionGate,
    pub(crate) metrics: MetricsTracker,
    closed: AtomicBool,
    evictor: Mutex<Option<Evictor>>,
}

/// Thread-safe pool of factory-created objects.
///
/// Borrowed objects are handed out as `Arc<T>`; the allocation behind the
/// `Arc` is the object's identity, so the same handle (or any clone of
/// it) must be given back to [`ObjectPool::return_object`]. Cloning the
/// pool is cheap and yields another handle to the same pool.
///
/// # Examples
///
/// ```
/// use borrowpool::{ObjectPool, PoolConfiguration};
///
/// let pool = ObjectPool::from_fn(|| String::from("conn"), PoolConfiguration::default()).unwrap();
///
/// let conn = pool.borrow_object().unwrap();
/// assert_eq!(conn.as_str(), "conn");
/// pool.return_object(&conn).unwrap();
/// assert_eq!(pool.free_count(), 1);
/// ```
pub struct ObjectPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> ObjectPool<T> {
    /// Create a new pool around a factory
    pub fn new<F>(factory: F, config: PoolConfiguration) -> PoolResult<Self>
    where
        F: ObjectFactory<T> + 'static,
    {
        config.validate()?;
        let pool = Self {
            inner: Arc::new(PoolInner {
                factory: Box::new(factory),
                config: ArcSwap::from_pointee(config),
                registry: Registry::new(),
                free: FreeList::new(),
                gate: AdmissionGate::new(),
                metrics: MetricsTracker::new(),
                closed: AtomicBool::new(false),
                evictor: Mutex::new(None),
            }),
        };
        pool.ensure_evictor();
        Ok(pool)
    }

    /// Create a pool whose objects come from a constructor closure
    pub fn from_fn<F>(create: F, config: PoolConfiguration) -> PoolResult<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(FnFactory::new(create), config)
    }

    /// Borrow an object, waiting at most the configured `max_wait_time`
    pub fn borrow_object(&self) -> PoolResult<Arc<T>> {
        let timeout = self.inner.config().max_wait_time;
        self.inner.borrow(timeout)
    }

    /// Borrow an object, waiting at most `timeout` (`None` waits forever)
    pub fn borrow_object_with_timeout(&self, timeout: Option<Duration>) -> PoolResult<Arc<T>> {
        self.inner.borrow(timeout)
    }

    /// Borrow an object wrapped in a guard that returns it on drop
    pub fn get_object(&self) -> PoolResult<PooledObject<T>> {
        let object = self.borrow_object()?;
        Ok(PooledObject::new(object, self.clone()))
    }

    /// Guarded borrow with an explicit wait budget
    pub fn get_object_with_timeout(&self, timeout: Option<Duration>) -> PoolResult<PooledObject<T>> {
        let object = self.borrow_object_with_timeout(timeout)?;
        Ok(PooledObject::new(object, self.clone()))
    }

    /// Borrow on tokio's blocking thread pool
    pub async fn borrow_object_async(&self) -> PoolResult<Arc<T>> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.borrow_object())
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Guarded borrow on tokio's blocking thread pool
    pub async fn get_object_async(&self) -> PoolResult<PooledObject<T>> {
        let object = self.borrow_object_async().await?;
        Ok(PooledObject::new(object, self.clone()))
    }

    /// Give a borrowed object back to the pool
    pub fn return_object(&self, object: &Arc<T>) -> PoolResult<()> {
        self.inner.give_back(object)
    }

    /// Destroy a pooled object, borrowed or idle
    pub fn destroy_object(&self, object: &Arc<T>) -> PoolResult<()> {
        let entry = self.inner.registry.lookup(object).ok_or(PoolError::NotMember)?;
        self.inner.destroy(&entry);
        Ok(())
    }

    /// Create one object and park it on the free-list
    pub fn add_object(&self) -> PoolResult<()> {
        self.inner.add()
    }

    /// Refresh the last-use time of a borrowed object
    pub fn touch_object(&self, object: &Arc<T>) -> PoolResult<()> {
        let entry = self.inner.registry.lookup(object).ok_or(PoolError::NotMember)?;
        if entry.touch() {
            Ok(())
        } else {
            Err(PoolError::InvalidState(entry.state()))
        }
    }

    /// Run one eviction sweep now
    pub fn evict(&self) -> EvictionReport {
        self.inner.evict()
    }

    /// Reclaim abandoned borrows now; returns how many were reclaimed
    pub fn remove_abandoned(&self) -> usize {
        self.inner.remove_abandoned()
    }

    /// Close the pool.
    ///
    /// New borrows and additions fail with [`PoolError::Closed`], blocked
    /// borrowers wake up and fail the same way, idle objects are destroyed
    /// and borrowed ones are destroyed as they come back.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.gate.close();
        self.inner.free.wake_all();
        let evictor = self.inner.evictor.lock().take();
        if let Some(evictor) = evictor {
            evictor.stop();
        }
        self.inner.clear_free();
        tracing::info!(remaining = self.inner.registry.len(), "pool closed");
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Current configuration snapshot
    pub fn configuration(&self) -> Arc<PoolConfiguration> {
        self.inner.config()
    }

    /// Replace the configuration. Operations already running may still
    /// see the previous snapshot for some of their steps.
    pub fn set_configuration(&self, config: PoolConfiguration) -> PoolResult<()> {
        config.validate()?;
        self.inner.config.store(Arc::new(config));
        self.ensure_evictor();
        Ok(())
    }

    /// Derive a new configuration from the current one
    ///
    /// ```
    /// use borrowpool::{ObjectPool, PoolConfiguration};
    /// use std::time::Duration;
    ///
    /// let pool = ObjectPool::from_fn(|| 0u8, PoolConfiguration::default()).unwrap();
    /// pool.update_configuration(|c| c.with_max_wait_time(Duration::from_millis(50)))
    ///     .unwrap();
    /// assert_eq!(pool.configuration().max_wait_time, Some(Duration::from_millis(50)));
    /// ```
    pub fn update_configuration<F>(&self, update: F) -> PoolResult<()>
    where
        F: FnOnce(PoolConfiguration) -> PoolConfiguration,
    {
        let current = PoolConfiguration::clone(&self.inner.config());
        self.set_configuration(update(current))
    }

    /// Idle objects on the free-list
    pub fn free_count(&self) -> usize {
        self.inner.free.len()
    }

    /// Objects currently borrowed
    pub fn used_count(&self) -> usize {
        self.inner.registry.len().saturating_sub(self.inner.free.len())
    }

    /// All live objects, idle or borrowed
    pub fn total_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Objects created over the pool's lifetime
    pub fn created_count(&self) -> u64 {
        self.inner.gate.created()
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.inner.metrics.get_metrics(
            self.created_count(),
            self.used_count(),
            self.free_count(),
            self.inner.config().max_total,
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    /// Get health status
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::new(
            self.free_count(),
            self.used_count(),
            self.inner.config().max_total,
            self.is_closed(),
        )
    }

    fn ensure_evictor(&self) {
        if self.is_closed() || self.inner.config().eviction_interval.is_none() {
            return;
        }
        let mut slot = self.inner.evictor.lock();
        if slot.as_ref().is_some_and(Evictor::is_running) {
            return;
        }
        match Evictor::spawn(Arc::downgrade(&self.inner)) {
            Ok(evictor) => *slot = Some(evictor),
            Err(err) => tracing::warn!(error = %err, "failed to start evictor thread"),
        }
    }
}

impl<T> PoolInner<T> {
    pub(crate) fn config(&self) -> Arc<PoolConfiguration> {
        self.config.load_full()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn borrow(&self, timeout: Option<Duration>) -> PoolResult<Arc<T>> {
        let started = Instant::now();
        // A budget too large to represent as an instant waits without bound
        let deadline = timeout.and_then(|timeout| started.checked_add(timeout));

        loop {
            if self.is_closed() {
                return Err(PoolError::Closed);
            }
            self.reclaim_if_saturated();

            let generation = self.free.generation();
            let (entry, fresh) = match self.free.pop() {
                Some(entry) => (entry, false),
                None => match self.create(deadline)? {
                    Some(entry) => (entry, true),
                    None => match self.free.wait_pop(generation, deadline) {
                        Some(entry) => (entry, false),
                        None => {
                            if let Some(timeout) = timeout {
                                if started.elapsed() >= timeout {
                                    MetricsTracker::increment(&self.metrics.borrow_timeouts);
                                    return Err(PoolError::Timeout(timeout));
                                }
                            }
                            continue;
                        }
                    },
                },
            };

            if let Some(object) = self.hand_out(&entry, fresh)? {
                return Ok(object);
            }
        }
    }

    /// Near saturation, look for leaked borrows before making the caller wait
    fn reclaim_if_saturated(&self) {
        let config = self.config();
        let (Some(max_total), Some(_)) = (config.max_total, config.abandoned_timeout) else {
            return;
        };
        let free = self.free.len();
        let used = self.registry.len().saturating_sub(free);
        if free < 2 && used as i64 > max_total as i64 - 3 {
            self.remove_abandoned();
        }
    }

    /// `Ok(None)` means the entry was lost to a concurrent destroy or failed
    /// validation after sitting idle; the caller should try again.
    fn hand_out(&self, entry: &Arc<PooledEntry<T>>, fresh: bool) -> PoolResult<Option<Arc<T>>> {
        if !entry.use_entry() {
            let state = entry.state();
            if state == EntryState::Destroyed {
                tracing::debug!("skipping entry destroyed while idle");
                return Ok(None);
            }
            return Err(PoolError::InvalidState(state));
        }

        if let Err(err) = self.factory.activate_object(entry) {
            MetricsTracker::increment(&self.metrics.factory_failures);
            self.destroy(entry);
            return Err(PoolError::ActivationFailed(err.to_string()));
        }

        if self.config().test_on_borrow && !self.factory.validate_object(entry) {
            MetricsTracker::increment(&self.metrics.validation_failures);
            self.destroy(entry);
            if fresh {
                return Err(PoolError::ValidationFailed);
            }
            return Ok(None);
        }

        MetricsTracker::increment(&self.metrics.total_borrowed);
        Ok(Some(Arc::clone(entry.shared())))
    }

    /// Admission-gated creation. `Ok(None)` when the pool is full.
    fn create(&self, deadline: Option<Instant>) -> PoolResult<Option<Arc<PooledEntry<T>>>> {
        let max_total = self.config().max_total;
        let Some(slot) = self.gate.admit(max_total, deadline)? else {
            return Ok(None);
        };

        match self.factory.create_object() {
            Ok(object) => {
                slot.succeed();
                let entry = Arc::new(PooledEntry::new(object));
                self.registry.insert(Arc::clone(&entry));
                tracing::debug!(claimed = self.gate.claimed(), "created pooled object");
                Ok(Some(entry))
            }
            Err(err) => {
                MetricsTracker::increment(&self.metrics.factory_failures);
                tracing::warn!(error = %err, "object creation failed");
                Err(PoolError::CreationFailed(err.to_string()))
            }
        }
    }

    fn give_back(&self, object: &Arc<T>) -> PoolResult<()> {
        let entry = self.registry.lookup(object).ok_or(PoolError::NotMember)?;
        entry.begin_return().map_err(PoolError::InvalidState)?;

        if let Err(err) = self.factory.passivate_object(&entry) {
            MetricsTracker::increment(&self.metrics.factory_failures);
            self.destroy(&entry);
            return Err(PoolError::PassivationFailed(err.to_string()));
        }

        let config = self.config();
        if config.test_on_return && !self.factory.validate_object(&entry) {
            MetricsTracker::increment(&self.metrics.validation_failures);
            self.destroy(&entry);
            return Ok(());
        }

        if !entry.give_back() {
            return Err(PoolError::InvalidState(entry.state()));
        }
        MetricsTracker::increment(&self.metrics.total_returned);

        if self.is_closed() {
            self.destroy(&entry);
            return Ok(());
        }
        if let Err(entry) = self.free.push(entry, config.order_policy, config.max_free) {
            self.destroy(&entry);
        }
        // close() may have drained the list before our push landed
        if self.is_closed() {
            self.clear_free();
        }
        Ok(())
    }

    fn add(&self) -> PoolResult<()> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        let config = self.config();
        if self.free.len() >= config.max_free {
            return Err(PoolError::PoolFull);
        }

        let deadline = config
            .max_wait_time
            .and_then(|wait| Instant::now().checked_add(wait));
        let entry = self.create(deadline)?.ok_or(PoolError::PoolFull)?;
        if let Err(entry) = self.free.push(entry, config.order_policy, config.max_free) {
            self.destroy(&entry);
            return Err(PoolError::PoolFull);
        }
        if self.is_closed() {
            self.clear_free();
        }
        Ok(())
    }

    /// Marks the entry destroyed and, if this call won, tears it down
    pub(crate) fn destroy(&self, entry: &Arc<PooledEntry<T>>) {
        if entry.destroy() {
            self.teardown(entry);
        }
    }

    /// Teardown of an entry already marked destroyed by the caller
    pub(crate) fn teardown(&self, entry: &Arc<PooledEntry<T>>) {
        self.free.remove(entry);
        if self.registry.remove(entry) {
            self.gate.release();
            // Blocked borrowers may now create in the freed slot
            self.free.wake_all();
        }
        MetricsTracker::increment(&self.metrics.total_destroyed);
        if let Err(err) = self.factory.destroy_object(entry) {
            MetricsTracker::increment(&self.metrics.factory_failures);
            tracing::warn!(error = %err, "destroy hook failed");
        }
        tracing::debug!(total = self.registry.len(), "destroyed pooled object");
    }

    fn clear_free(&self) {
        for entry in self.free.drain() {
            self.destroy(&entry);
        }
    }
}
