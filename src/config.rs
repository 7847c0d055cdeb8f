//! # Global engine configuration.
//!
//! [`Config`] centralizes the sequencer and notification settings. Per-type
//! batching policy lives in [`Options`](crate::Options) instead, attached
//! to each dispatcher registration.

use std::time::Duration;

use crate::policies::Backoff;

/// Global configuration for the batch manager.
///
/// ## Field semantics
/// - `read_page_size`: messages read per sequencer pass; a full page skips
///   the tap/timeout wait and reads again immediately
/// - `poll_timeout`: worst-case staleness — the sequencer wakes
///   unconditionally after this long even with no shoulder tap
/// - `hint_capacity`: bound of the new-message hint intake; producers never
///   block and overflow hints are dropped (hints are wake hints only)
/// - `bus_capacity`: event bus ring buffer (min 1, clamped)
/// - `retry`: backoff curve shared by every persistence retry loop
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Page size for sequencer reads.
    pub read_page_size: usize,
    /// Unconditional wake interval for the sequencer.
    pub poll_timeout: Duration,
    /// Capacity of the new-message hint channel.
    pub hint_capacity: usize,
    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,
    /// Backoff curve for persistence retries.
    pub retry: Backoff,
}

impl Config {
    /// Page size clamped to a minimum of 1.
    #[inline]
    pub fn page_size_clamped(&self) -> usize {
        self.read_page_size.max(1)
    }

    /// Hint capacity clamped to a minimum of 1.
    #[inline]
    pub fn hint_capacity_clamped(&self) -> usize {
        self.hint_capacity.max(1)
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Defaults:
    ///
    /// - `read_page_size = 100`
    /// - `poll_timeout = 30s`
    /// - `hint_capacity = 100`
    /// - `bus_capacity = 1024`
    /// - `retry = Backoff::default()` (250ms..30s, ×2)
    fn default() -> Self {
        Self {
            read_page_size: 100,
            poll_timeout: Duration::from_secs(30),
            hint_capacity: 100,
            bus_capacity: 1024,
            retry: Backoff::default(),
        }
    }
}
