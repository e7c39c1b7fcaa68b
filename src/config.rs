//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which end of the free-list returned objects re-enter service from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderPolicy {
    /// Hand out the most recently returned object first, keeping the
    /// working set warm and letting surplus objects age out.
    #[default]
    Lifo,

    /// Hand out the least recently returned object first, spreading
    /// usage evenly across all pooled objects.
    Fifo,
}

/// Configuration for object pool behavior
///
/// `None` means unbounded for `max_total` and `max_wait_time`, and
/// disabled for the timeouts and the eviction interval.
///
/// # Examples
///
/// ```
/// use borrowpool::{OrderPolicy, PoolConfiguration};
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_max_total(16)
///     .with_max_free(8)
///     .with_min_free(2)
///     .with_max_wait_time(Duration::from_secs(5))
///     .with_order_policy(OrderPolicy::Fifo);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.max_total, Some(16));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfiguration {
    /// Maximum number of live objects, borrowed or idle
    pub max_total: Option<usize>,

    /// Maximum number of idle objects kept on the free-list
    pub max_free: usize,

    /// Number of idle objects eviction always leaves in place
    pub min_free: usize,

    /// How long a borrow may block for a free object or a creation slot
    pub max_wait_time: Option<Duration>,

    /// How long an object may sit idle before the evictor destroys it
    pub idle_timeout: Option<Duration>,

    /// How long a borrowed object may go unused before it is reclaimed
    pub abandoned_timeout: Option<Duration>,

    /// Cadence of the background eviction sweep
    pub eviction_interval: Option<Duration>,

    /// Free-list ordering
    pub order_policy: OrderPolicy,

    /// Run the factory's validation hook before handing out an object
    pub test_on_borrow: bool,

    /// Run the factory's validation hook when an object comes back
    pub test_on_return: bool,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            max_total: Some(8),
            max_free: 8,
            min_free: 2,
            max_wait_time: None,
            idle_timeout: None,
            abandoned_timeout: None,
            eviction_interval: None,
            order_policy: OrderPolicy::Lifo,
            test_on_borrow: false,
            test_on_return: false,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the capacity bounds against each other.
    ///
    /// Inconsistent bounds are rejected, never clamped.
    ///
    /// ```
    /// use borrowpool::{PoolConfiguration, PoolError};
    ///
    /// let config = PoolConfiguration::new().with_max_free(1).with_min_free(3);
    /// assert!(matches!(config.validate(), Err(PoolError::ConfigInvalid(_))));
    /// ```
    pub fn validate(&self) -> PoolResult<()> {
        if self.min_free > self.max_free {
            return Err(PoolError::ConfigInvalid(format!(
                "min_free ({}) must not exceed max_free ({})",
                self.min_free, self.max_free
            )));
        }
        if self.eviction_interval == Some(Duration::ZERO) {
            return Err(PoolError::ConfigInvalid(
                "eviction_interval must be greater than zero".to_string(),
            ));
        }
        if let Some(max_total) = self.max_total {
            if self.max_free > max_total {
                return Err(PoolError::ConfigInvalid(format!(
                    "max_free ({}) must not exceed max_total ({})",
                    self.max_free, max_total
                )));
            }
        }
        Ok(())
    }

    /// Set the total capacity
    pub fn with_max_total(mut self, max_total: usize) -> Self {
        self.max_total = Some(max_total);
        self
    }

    /// Remove the total capacity bound
    pub fn with_unbounded_total(mut self) -> Self {
        self.max_total = None;
        self
    }

    /// Set the maximum idle count
    pub fn with_max_free(mut self, max_free: usize) -> Self {
        self.max_free = max_free;
        self
    }

    /// Set the minimum idle count kept by eviction
    pub fn with_min_free(mut self, min_free: usize) -> Self {
        self.min_free = min_free;
        self
    }

    /// Set the blocking budget of a borrow
    pub fn with_max_wait_time(mut self, wait: Duration) -> Self {
        self.max_wait_time = Some(wait);
        self
    }

    /// Set the idle time-to-live
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set the time after which an unreturned borrow counts as abandoned
    pub fn with_abandoned_timeout(mut self, timeout: Duration) -> Self {
        self.abandoned_timeout = Some(timeout);
        self
    }

    /// Enable the background evictor with the given cadence
    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = Some(interval);
        self
    }

    /// Set the free-list ordering
    pub fn with_order_policy(mut self, policy: OrderPolicy) -> Self {
        self.order_policy = policy;
        self
    }

    /// Validate objects before they are handed out
    pub fn with_test_on_borrow(mut self) -> Self {
        self.test_on_borrow = true;
        self
    }

    /// Validate objects as they are returned
    pub fn with_test_on_return(mut self) -> Self {
        self.test_on_return = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = PoolConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_total, Some(8));
        assert_eq!(config.max_free, 8);
        assert_eq!(config.min_free, 2);
        assert_eq!(config.order_policy, OrderPolicy::Lifo);
    }

    #[test]
    fn rejects_max_free_above_max_total() {
        let config = PoolConfiguration::new().with_max_total(4).with_max_free(5);
        assert!(matches!(config.validate(), Err(PoolError::ConfigInvalid(_))));
    }

    #[test]
    fn unbounded_total_accepts_any_max_free() {
        let config = PoolConfiguration::new()
            .with_unbounded_total()
            .with_max_free(1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_eviction_interval() {
        let config = PoolConfiguration::new().with_eviction_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(PoolError::ConfigInvalid(_))));
    }

    #[test]
    fn min_free_equal_to_max_free_is_accepted() {
        let config = PoolConfiguration::new().with_max_free(3).with_min_free(3);
        assert!(config.validate().is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_partial_configuration() {
        let config: PoolConfiguration =
            serde_json::from_str(r#"{"max_total": 4, "max_free": 4, "order_policy": "Fifo"}"#)
                .unwrap();
        assert_eq!(config.max_total, Some(4));
        assert_eq!(config.min_free, 2);
        assert_eq!(config.order_policy, OrderPolicy::Fifo);
    }
}
