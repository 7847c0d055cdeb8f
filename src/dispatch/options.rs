//! Per-type batching options.

use std::time::Duration;

/// Batching policy attached to one dispatcher registration.
///
/// ## Sentinel values
/// - `batch_timeout = 0s` → flush immediately: the first message to open a
///   batch seals it on the very next poll unless a burst fills it to
///   `batch_max_size` first.
/// - `dispose_timeout = 0s` → the assembler worker, once created, is kept
///   alive for the lifetime of the engine (no idle teardown).
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Maximum member count; reaching it seals the batch immediately.
    pub batch_max_size: usize,
    /// Maximum time a batch stays open after its first message.
    pub batch_timeout: Duration,
    /// Idle period after which the assembler worker tears itself down.
    pub dispose_timeout: Duration,
}

impl Default for Options {
    /// `batch_max_size = 100`, `batch_timeout = 250ms`,
    /// `dispose_timeout = 0` (keep alive).
    fn default() -> Self {
        Self {
            batch_max_size: 100,
            batch_timeout: Duration::from_millis(250),
            dispose_timeout: Duration::ZERO,
        }
    }
}

impl Options {
    /// The effective max size, clamped to a minimum of 1.
    #[inline]
    pub fn max_size_clamped(&self) -> usize {
        self.batch_max_size.max(1)
    }

    /// The idle-teardown period as an `Option`.
    ///
    /// - `None` → keep the worker alive indefinitely
    /// - `Some(d)` → tear down after `d` of idleness
    #[inline]
    pub fn dispose(&self) -> Option<Duration> {
        if self.dispose_timeout == Duration::ZERO {
            None
        } else {
            Some(self.dispose_timeout)
        }
    }
}
