//! Deadline-carrying context passed through every remote operation.
//!
//! Dropping a future already cancels it, so the context only needs to carry an
//! optional deadline. Work bounded by a context is raced against that deadline
//! with [`Context::run`].

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// An operation was aborted because its context deadline fired first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancelled {
    pub label: String,
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: context deadline exceeded", self.label)
    }
}

impl std::error::Error for Cancelled {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    deadline: Option<Instant>,
}

impl Context {
    /// A context that never expires.
    pub fn background() -> Self {
        Self { deadline: None }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Derives a context that expires at the earlier of this context's
    /// deadline and `now + timeout`.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < own => parent,
            _ => own,
        };
        Self::with_deadline(deadline)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Drives `future` to completion unless the deadline fires first.
    pub async fn run<F>(&self, label: &str, future: F) -> Result<F::Output, Cancelled>
    where
        F: Future,
    {
        match self.deadline {
            None => Ok(future.await),
            Some(deadline) => tokio::time::timeout_at(deadline, future)
                .await
                .map_err(|_| Cancelled {
                    label: label.to_string(),
                }),
        }
    }
}
