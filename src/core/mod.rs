//! Reconciliation logic.
//!
//! This module contains:
//! - Compare: similarity and identity comparison of records
//! - Filter: candidate selection by play count
//! - Crossref: matching entries of one collection against another
//! - Limits: option validation against service maxima
//! - Stage: per-stage loading/error/success state
//! - Orchestrator: the `Reconciler` driving a run

pub mod compare;
pub mod crossref;
pub mod filter;
pub mod limits;
pub mod orchestrator;
pub mod stage;

// Re-export commonly used types
pub use compare::{Comparator, DEFAULT_THRESHOLD};
pub use crossref::cross_reference;
pub use filter::RecordFilter;
pub use limits::{Period, RunParams, ServiceLimits, ValidationError};
pub use orchestrator::{
    Readiness, ReconcileError, ReconcileSnapshot, Reconciler, RunContext, SearchDirection, Side,
    StageOutcome,
};
pub use stage::{Stage, StageError, StageState};
