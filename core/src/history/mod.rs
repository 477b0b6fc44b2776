//! Mutation log.
//!
//! Every undoable edit is stored as a pair of [`Transition`]s: the changes
//! that redo it and the changes that undo it. The log is linear with a
//! cursor; a new edit made after undoing discards the redo tail.

pub mod store;
pub mod types;


pub use store::{JsonLinesStore, LogStore, MemoryStore, StoredLog};
pub use types::{Change, LogEntry, MutationLog, Transition};
