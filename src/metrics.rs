//! Metrics collection and export for object pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use borrowpool::{ObjectPool, PoolConfiguration};
///
/// let pool = ObjectPool::from_fn(|| 0u32, PoolConfiguration::default()).unwrap();
///
/// let obj = pool.borrow_object().unwrap();
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_borrowed, 1);
/// assert_eq!(metrics.total_created, 1);
/// assert_eq!(metrics.used_objects, 1);
/// pool.return_object(&obj).unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolMetrics {
    /// Objects ever created by the factory
    pub total_created: u64,

    /// Objects torn down, for any reason
    pub total_destroyed: u64,

    /// Successful borrows
    pub total_borrowed: u64,

    /// Returns that put the object back on the free-list or destroyed it
    pub total_returned: u64,

    /// Idle objects removed by the evictor
    pub idle_evicted: u64,

    /// Borrowed objects reclaimed as abandoned
    pub abandoned_reclaimed: u64,

    /// Borrows that ran out of wait budget
    pub borrow_timeouts: u64,

    /// Objects rejected by the validation hook
    pub validation_failures: u64,

    /// Failed create, activate, passivate or destroy hooks
    pub factory_failures: u64,

    /// Objects currently borrowed
    pub used_objects: usize,

    /// Objects currently idle
    pub free_objects: usize,

    /// Capacity bound, if any
    pub max_total: Option<usize>,

    /// Borrowed share of capacity (0.0 to 1.0); 0.0 when unbounded
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_destroyed".to_string(), self.total_destroyed.to_string());
        metrics.insert("total_borrowed".to_string(), self.total_borrowed.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("idle_evicted".to_string(), self.idle_evicted.to_string());
        metrics.insert("abandoned_reclaimed".to_string(), self.abandoned_reclaimed.to_string());
        metrics.insert("borrow_timeouts".to_string(), self.borrow_timeouts.to_string());
        metrics.insert("validation_failures".to_string(), self.validation_failures.to_string());
        metrics.insert("factory_failures".to_string(), self.factory_failures.to_string());
        metrics.insert("used_objects".to_string(), self.used_objects.to_string());
        metrics.insert("free_objects".to_string(), self.free_objects.to_string());
        metrics.insert(
            "max_total".to_string(),
            self.max_total.map_or_else(|| "unbounded".to_string(), |max| max.to_string()),
        );
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use borrowpool::{ObjectPool, PoolConfiguration};
    /// use std::collections::HashMap;
    ///
    /// let pool = ObjectPool::from_fn(|| 1u8, PoolConfiguration::default()).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("my_pool", Some(&tags));
    /// assert!(output.contains("borrowpool_objects_used"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges = [
            ("borrowpool_objects_used", "Current borrowed objects", metrics.used_objects as f64),
            ("borrowpool_objects_free", "Current idle objects", metrics.free_objects as f64),
            ("borrowpool_utilization", "Pool utilization ratio", metrics.utilization),
        ];
        for (name, help, value) in gauges {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} gauge\n"));
            output.push_str(&format!("{name}{{{labels}}} {value}\n"));
        }

        let counters = [
            ("borrowpool_objects_created_total", "Objects created", metrics.total_created),
            ("borrowpool_objects_destroyed_total", "Objects destroyed", metrics.total_destroyed),
            ("borrowpool_objects_borrowed_total", "Successful borrows", metrics.total_borrowed),
            ("borrowpool_objects_returned_total", "Objects returned", metrics.total_returned),
            ("borrowpool_idle_evicted_total", "Idle objects evicted", metrics.idle_evicted),
            ("borrowpool_abandoned_reclaimed_total", "Abandoned objects reclaimed", metrics.abandoned_reclaimed),
            ("borrowpool_borrow_timeouts_total", "Borrows that timed out", metrics.borrow_timeouts),
            ("borrowpool_validation_failures_total", "Validation failures", metrics.validation_failures),
            ("borrowpool_factory_failures_total", "Factory hook failures", metrics.factory_failures),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name}{{{labels}}} {value}\n"));
        }

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut sorted: Vec<_> = tags.iter().collect();
            sorted.sort();
            for (key, value) in sorted {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_destroyed: AtomicU64,
    pub total_borrowed: AtomicU64,
    pub total_returned: AtomicU64,
    pub idle_evicted: AtomicU64,
    pub abandoned_reclaimed: AtomicU64,
    pub borrow_timeouts: AtomicU64,
    pub validation_failures: AtomicU64,
    pub factory_failures: AtomicU64,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(
        &self,
        total_created: u64,
        used: usize,
        free: usize,
        max_total: Option<usize>,
    ) -> PoolMetrics {
        let utilization = match max_total {
            Some(max) if max > 0 => used as f64 / max as f64,
            _ => 0.0,
        };

        PoolMetrics {
            total_created,
            total_destroyed: self.total_destroyed.load(Ordering::Relaxed),
            total_borrowed: self.total_borrowed.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            idle_evicted: self.idle_evicted.load(Ordering::Relaxed),
            abandoned_reclaimed: self.abandoned_reclaimed.load(Ordering::Relaxed),
            borrow_timeouts: self.borrow_timeouts.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            factory_failures: self.factory_failures.load(Ordering::Relaxed),
            used_objects: used,
            free_objects: free,
            max_total,
            utilization,
        }
    }
}
