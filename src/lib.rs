//! chartsync - Reconcile a streaming library against a listening chart
//!
//! Fetches a user's library from a streaming service and their top chart
//! from a scrobbling service, matches the two despite inconsistent naming and
//! missing identifiers, and derives which items to import and which to clear.
//!
//! # Architecture
//!
//! Every fetched record carries a lifecycle status that only moves forward
//! through a pure reducer:
//! - Fetching sets the content, filtering selects candidates
//! - Searching the other service confirms candidates by fuzzy comparison
//! - Cross-comparing marks what is missing on the other side
//! - Applying an action resolves the marked entries
//!
//! # Modules
//!
//! - `adapters`: Service contracts plus Spotify and Last.fm clients
//! - `core`: Comparison, filtering, cross-reference and the `Reconciler`
//! - `domain`: Records, statuses, events and the reducer
//! - `store`: Credential storage
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Store credentials
//! chartsync login --library-token <token> --chart-key <key> --chart-user <name>
//!
//! # Show what would change
//! chartsync plan --kind artist --period 3month
//!
//! # Import missing chart artists into the library
//! chartsync apply --import
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::{Reconciler, RunContext, SearchDirection, Side, StageOutcome};
pub use domain::{Action, ContentKind, ContentRecord, Entry, RecordCollection, Status};
