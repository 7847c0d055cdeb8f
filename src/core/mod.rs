//! Engine internals: manager, sequencer, assemblers, offset cursor.

mod assembler;
mod builder;
mod manager;
mod notify;
mod offset;
mod registry;
mod sequencer;

pub use builder::BatchManagerBuilder;
pub use manager::BatchManager;
