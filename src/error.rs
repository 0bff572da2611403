//! Error types for semaphore operations

use thiserror::Error;

/// The semaphore was stopped while the caller was waiting for a permit.
///
/// Returned by [`Semaphore::acquire`](crate::Semaphore::acquire) once
/// shutdown has been requested. No permit is granted after this point,
/// even when capacity is available.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("semaphore stopped")]
pub struct Stopped;

/// Error returned by [`Semaphore::try_acquire`](crate::Semaphore::try_acquire).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryAcquireError {
    /// The semaphore has been stopped; no permit will ever be granted again.
    #[error("semaphore stopped")]
    Stopped,

    /// All permits are currently held. A later call may succeed.
    #[error("no permits available")]
    NoPermits,
}

impl TryAcquireError {
    /// Returns `true` if the failure is permanent (the semaphore stopped),
    /// as opposed to transient permit exhaustion.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, TryAcquireError::Stopped)
    }
}
