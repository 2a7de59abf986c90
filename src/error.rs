//! Service-level error surfaced by the intake operations.

use thiserror::Error;

use crate::infrastructure::{queue::QueueError, store::StoreError};

pub type ServiceResult<T = ()> = Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request; never retried.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Legal request against an illegal state (cancel of a running job,
    /// duplicate job id).
    #[error("{0}")]
    Conflict(String),

    /// Store failures other than a missing row.
    #[error(transparent)]
    Store(StoreError),

    /// Queue/cache backend unreachable or misbehaving.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound("Job not found".to_string()),
            StoreError::DuplicateId(id) => Self::Conflict(format!("Job already exists: {id}")),
            other => Self::Store(other),
        }
    }
}
