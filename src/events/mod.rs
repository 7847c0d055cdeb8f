//! Lifecycle events and the broadcast bus that delivers them.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
