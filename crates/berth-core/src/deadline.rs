//! Deadline-bounded execution for blocking engine calls.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// A fixed deadline computed once from an optional timeout.
///
/// `None` (or a zero duration) means unbounded: [`Deadline::bound`] awaits
/// the wrapped future directly. Otherwise every `bound` call races its
/// future against the same deadline and fails with [`Error::Timeout`] when
/// the deadline elapses first.
///
/// Cancellation is cooperative: losing the race drops the bounded future,
/// which closes whatever transport resource it owned (an HTTP stream, a
/// process pipe). Adapters that accumulate streamed output bound each chunk
/// read rather than the whole read loop, so everything produced before the
/// deadline is already in the caller's buffers when the timeout fires.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    timeout: Option<Duration>,
    at: Option<Instant>,
}

impl Deadline {
    /// Create a deadline starting now.
    pub fn new(timeout: Option<Duration>) -> Self {
        let timeout = timeout.filter(|t| !t.is_zero());
        Self {
            timeout,
            at: timeout.map(|t| Instant::now() + t),
        }
    }

    /// An unbounded deadline.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// True when a timeout was configured.
    pub fn is_bounded(&self) -> bool {
        self.at.is_some()
    }

    /// Resolve `fut`, failing with [`Error::Timeout`] if the deadline
    /// elapses first.
    pub async fn bound<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        match self.at {
            None => Ok(fut.await),
            Some(at) => match tokio::time::timeout_at(at, fut).await {
                Ok(value) => Ok(value),
                Err(_) => {
                    tracing::debug!(timeout = ?self.timeout, "deadline elapsed");
                    Err(Error::Timeout(self.timeout.unwrap_or_default()))
                }
            },
        }
    }
}
