//! Cooperative cancellation for long scans.
//!
//! A [`CancelToken`] trips either when [`CancelToken::cancel`] is called on
//! any clone or when its optional deadline passes. Stages poll
//! [`CancelToken::check`] between units of work and stop issuing new work once
//! it fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

/// The scan was stopped before it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Canceled {
    #[error("operation canceled")]
    Requested,
    #[error("operation exceeded its deadline")]
    DeadlineExceeded,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that only trips when canceled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also trips once `timeout` has elapsed from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.check().is_err()
    }

    pub fn check(&self) -> Result<(), Canceled> {
        if self.flag.load(Ordering::Relaxed) {
            return Err(Canceled::Requested);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Canceled::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{CancelToken, Canceled};

    #[test]
    fn clones_share_the_cancel_flag() {
        let token = CancelToken::new();
        let worker = token.clone();
        assert!(worker.check().is_ok());
        token.cancel();
        assert_eq!(worker.check(), Err(Canceled::Requested));
    }

    #[test]
    fn deadline_trips_without_explicit_cancel() {
        let token = CancelToken::with_timeout(Duration::ZERO);
        assert_eq!(token.check(), Err(Canceled::DeadlineExceeded));
        assert!(CancelToken::with_timeout(Duration::from_secs(3600)).check().is_ok());
    }
}
