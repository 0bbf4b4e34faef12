//! Domain types for reconciliation.
//!
//! This module contains the core data structures:
//! - Records: the normalized shape both services are parsed into
//! - Events: stage-completion events for the reducer
//! - Collection: one service's entries and the reducer applying events

pub mod collection;
pub mod events;
pub mod record;

// Re-export commonly used types
pub use collection::{reduce, RecordCollection, StatusCounts};
pub use events::{ReconcileEvent, WireEvent};
pub use record::{Action, ContentKind, ContentRecord, Entry, Profile, Status};
