//! Per-caller transcript storage for call sessions.
//!
//! A session is implicitly created on the first appended turn and lives for
//! the lifetime of the process; the store is the only mutable state shared
//! between concurrent call callbacks.

pub mod in_memory;
pub mod traits;

pub use in_memory::InMemoryTranscriptStore;
pub use traits::{CallerId, TranscriptStore, Turn};
