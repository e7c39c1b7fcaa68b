//! Error types for the object pool

use crate::entry::EntryState;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    #[error("Pool is closed")]
    Closed,

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Object does not belong to this pool")]
    NotMember,

    #[error("Pooled entry is in unexpected state {0:?}")]
    InvalidState(EntryState),

    #[error("Object creation failed: {0}")]
    CreationFailed(String),

    #[error("Object activation failed: {0}")]
    ActivationFailed(String),

    #[error("Object passivation failed: {0}")]
    PassivationFailed(String),

    #[error("Object validation failed")]
    ValidationFailed,

    #[error("Pool is at maximum capacity")]
    PoolFull,

    #[error("Invalid pool configuration: {0}")]
    ConfigInvalid(String),

    #[error("Operation was cancelled")]
    Cancelled,
}

pub type PoolResult<T> = Result<T, PoolError>;
