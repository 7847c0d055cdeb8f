//! Dispatch surface: the handler contract and per-type batching options.

mod handler;
mod options;

pub use handler::{Dispatch, DispatchFn, DispatchRef};
pub use options::Options;
