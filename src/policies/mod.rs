//! Retry policies for persistence operations.

mod retry;

pub use retry::{Backoff, Retry};
