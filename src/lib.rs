//! # borrowpool
//!
//! Bounded, thread-safe pool of expensive-to-create objects such as
//! connections or buffers.
//!
//! ## Features
//!
//! - Admission-controlled creation: live objects never exceed `max_total`
//! - Blocking borrow with a wait budget and explicit timeout errors
//! - Factory hooks to create, activate, validate, passivate and destroy objects
//! - LIFO or FIFO reuse order
//! - Idle eviction bounded by `min_free`, on a background thread
//! - Reclamation of abandoned borrows
//! - RAII guards and async borrow
//! - Metrics (map and Prometheus text) and health status
//!
//! ## Quick Start
//!
//! ```rust
//! use borrowpool::{ObjectPool, PoolConfiguration};
//! use std::time::Duration;
//!
//! let config = PoolConfiguration::new()
//!     .with_max_total(4)
//!     .with_max_free(4)
//!     .with_max_wait_time(Duration::from_secs(1));
//! let pool = ObjectPool::from_fn(|| Vec::<u8>::with_capacity(4096), config).unwrap();
//!
//! {
//!     let buffer = pool.get_object().unwrap();
//!     assert!(buffer.capacity() >= 4096);
//!     // Buffer automatically returned when `buffer` goes out of scope
//! }
//! assert_eq!(pool.free_count(), 1);
//! ```

mod admission;
mod config;
mod entry;
mod errors;
mod eviction;
mod factory;
mod free_list;
mod health;
mod metrics;
mod pool;
mod registry;

pub use config::{OrderPolicy, PoolConfiguration};
pub use entry::{EntryState, PooledEntry};
pub use errors::{PoolError, PoolResult};
pub use eviction::EvictionReport;
pub use factory::{FactoryError, ObjectFactory};
pub use health::HealthStatus;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::{ObjectPool, PooledObject};
