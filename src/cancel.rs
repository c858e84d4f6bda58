//! Cancellation and deadline context (§5, §9 "Cancellation / deadlines").
//!
//! Every suspension point in the crate (retry sleep, debounce sleep,
//! systemd subprocess wait, channel send, file I/O) is written against a
//! [`Ctx`] so a caller can cancel or bound any single call. This mirrors
//! `conmon-rs`'s use of `tokio_util::sync::CancellationToken` for its
//! shutdown path, generalized here to also carry an optional deadline.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::ErrorCause;

/// A point in time after which an operation must give up, or none.
pub type Deadline = Option<Instant>;

/// Cancellation + deadline carried through every component's suspension
/// points. Cheap to clone; clones share the same cancellation token.
#[derive(Clone)]
pub struct Ctx {
    cancel: CancellationToken,
    deadline: Deadline,
}

impl Default for Ctx {
    fn default() -> Self {
        Self::new()
    }
}

impl Ctx {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Derives a child context sharing this one's cancellation token but
    /// with a deadline no later than `now + timeout` (§5: "the coordinator's
    /// per-op deadline is the minimum of the caller deadline and `timeout`").
    pub fn narrowed_by(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) => Some(existing.min(candidate)),
            None => Some(candidate),
        };
        Self {
            cancel: self.cancel.clone(),
            deadline,
        }
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Remaining time until the deadline, or `None` if there isn't one.
    /// A deadline already in the past yields `Duration::ZERO`.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Races `fut` against cancellation and the deadline. Returns
    /// `Cancelled`/`Timeout` immediately if either fires first.
    pub async fn race<F, T>(&self, fut: F) -> Result<T, ErrorCause>
    where
        F: Future<Output = T>,
    {
        tokio::pin!(fut);
        match self.remaining() {
            Some(remaining) if remaining.is_zero() => Err(ErrorCause::Timeout),
            Some(remaining) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(ErrorCause::Cancelled),
                    _ = tokio::time::sleep(remaining) => Err(ErrorCause::Timeout),
                    out = &mut fut => Ok(out),
                }
            }
            None => {
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(ErrorCause::Cancelled),
                    out = &mut fut => Ok(out),
                }
            }
        }
    }

    /// Sleeps for `dur`, cancellable and bounded by the deadline. Used by
    /// the control client's backoff and the watcher's debounce timer.
    pub async fn sleep(&self, dur: Duration) -> Result<(), ErrorCause> {
        self.race(tokio::time::sleep(dur)).await
    }
}
