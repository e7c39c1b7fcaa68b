//! Factory hooks that create and maintain pooled objects

use crate::entry::PooledEntry;

/// Error returned by factory hooks
pub type FactoryError = Box<dyn std::error::Error + Send + Sync>;

/// Knows how to build, check and tear down one kind of pooled object.
///
/// Only `create_object` is required. The pool calls `activate_object`
/// before handing an object out and `passivate_object` when it comes back;
/// `validate_object` runs on the paths enabled by `test_on_borrow` and
/// `test_on_return`. `destroy_object` is best effort: its error is logged
/// and never reaches a caller.
///
/// # Examples
///
/// ```
/// use borrowpool::{FactoryError, ObjectFactory, PooledEntry};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// struct Counter(AtomicUsize);
///
/// impl ObjectFactory<Vec<u8>> for Counter {
///     fn create_object(&self) -> Result<Vec<u8>, FactoryError> {
///         self.0.fetch_add(1, Ordering::Relaxed);
///         Ok(Vec::with_capacity(1024))
///     }
///
///     fn validate_object(&self, entry: &PooledEntry<Vec<u8>>) -> bool {
///         entry.object().capacity() >= 1024
///     }
/// }
/// ```
pub trait ObjectFactory<T>: Send + Sync {
    fn create_object(&self) -> Result<T, FactoryError>;

    fn activate_object(&self, _entry: &PooledEntry<T>) -> Result<(), FactoryError> {
        Ok(())
    }

    fn validate_object(&self, _entry: &PooledEntry<T>) -> bool {
        true
    }

    fn passivate_object(&self, _entry: &PooledEntry<T>) -> Result<(), FactoryError> {
        Ok(())
    }

    fn destroy_object(&self, _entry: &PooledEntry<T>) -> Result<(), FactoryError> {
        Ok(())
    }
}

/// Factory backed by a plain constructor closure
pub(crate) struct FnFactory<F> {
    create: F,
}

impl<F> FnFactory<F> {
    pub(crate) fn new(create: F) -> Self {
        Self { create }
    }
}

impl<T, F> ObjectFactory<T> for FnFactory<F>
where
    F: Fn() -> T + Send + Sync,
{
    fn create_object(&self) -> Result<T, FactoryError> {
        Ok((self.create)())
    }
}
