//! Health monitoring for object pools

/// Health status of an object pool
///
/// # Examples
///
/// ```
/// use borrowpool::{ObjectPool, PoolConfiguration};
///
/// let pool = ObjectPool::from_fn(|| 0u8, PoolConfiguration::default()).unwrap();
/// pool.add_object().unwrap();
///
/// let health = pool.get_health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.free_objects, 1);
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Borrowed share of capacity (0.0 to 1.0)
    pub utilization: f64,

    /// Idle objects count
    pub free_objects: usize,

    /// Borrowed objects count
    pub used_objects: usize,

    /// Capacity bound, if any
    pub max_total: Option<usize>,

    /// Whether the pool has been closed
    pub closed: bool,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(free: usize, used: usize, max_total: Option<usize>, closed: bool) -> Self {
        let utilization = match max_total {
            Some(max) if max > 0 => used as f64 / max as f64,
            _ => 0.0,
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if closed {
            warnings.push("Pool is closed".to_string());
            is_healthy = false;
        }

        // Borrowers are about to start blocking
        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if free == 0 && used > 0 {
            warnings.push("No idle objects".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            free_objects: free,
            used_objects: used,
            max_total,
            closed,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
