//! # Retry with capped exponential backoff.
//!
//! [`Backoff`] computes the delay curve; [`Retry`] drives an operation
//! through it. The delay for attempt `n` is `first × factor^n`, clamped to
//! [`Backoff::max`]. The base is derived purely from the attempt number, so
//! a long outage settles at the cap instead of drifting.
//!
//! [`Retry::run`] keeps attempting an operation for as long as it fails with
//! a retryable error and the governing token is live:
//!
//! ```text
//! loop {
//!   op(attempt)
//!     ├─ Ok(v)                      → return Ok(v)
//!     ├─ Err(e) non-retryable       → return Err(e)
//!     ├─ Err(e), token cancelled    → return Err(e)   (last error surfaced)
//!     └─ Err(e) retryable           → sleep(backoff) cancellable → attempt+1
//! }
//! ```
//!
//! There is no attempt cap: a persistent store outage stalls the caller
//! (with capped delays) until the token is cancelled, at which point the
//! last error is surfaced immediately.

use std::future::Future;
use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::DispatchError;

/// Capped exponential delay curve.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    /// Delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
}

impl Default for Backoff {
    /// `first = 250ms`, `max = 30s`, `factor = 2.0`.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(250),
            max: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl Backoff {
    /// Computes the delay for the given attempt number (0-indexed).
    ///
    /// Overflow, non-finite intermediate values, and huge attempt numbers
    /// all clamp to [`Backoff::max`].
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Drives an operation through a [`Backoff`] curve under a token.
#[derive(Clone, Copy, Debug, Default)]
pub struct Retry {
    /// The delay curve between attempts.
    pub backoff: Backoff,
}

impl Retry {
    /// Creates a retry driver over the given curve.
    pub fn new(backoff: Backoff) -> Self {
        Self { backoff }
    }

    /// Runs `op` until it succeeds, fails non-retryably, or the token is
    /// cancelled. The closure receives the 0-indexed attempt number and is
    /// called once per attempt.
    pub async fn run<T, F, Fut>(
        &self,
        token: &CancellationToken,
        mut op: F,
    ) -> Result<T, DispatchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DispatchError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if !e.is_retryable() || token.is_cancelled() => return Err(e),
                Err(e) => {
                    let delay = self.backoff.next(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after failure"
                    );
                    attempt = attempt.saturating_add(1);

                    let sleep = time::sleep(delay);
                    tokio::pin!(sleep);
                    select! {
                        _ = &mut sleep => {}
                        _ = token.cancelled() => return Err(e),
                    }
                }
            }
        }
    }
}
