//! Events driving the reconciliation reducer.
//!
//! Everything the reconciler dispatches internally is a [`ReconcileEvent`],
//! a closed enum carrying exactly the payload its transition needs.
//! [`WireEvent`] is the serialized form accepted from outside the process;
//! unrecognized wire types decode to [`WireEvent::Unknown`] and are ignored.

use serde::{Deserialize, Serialize};

use crate::core::compare::Comparator;
use crate::core::filter::RecordFilter;

use super::record::{Action, ContentRecord, Entry};

/// A stage-completion event applied to one collection
#[derive(Debug, Clone)]
pub enum ReconcileEvent<'a> {
    /// Replace the collection with freshly fetched records
    SetContent(Vec<ContentRecord>),

    /// FETCHED -> FILTERED for records passing the filter
    ApplyFilter(RecordFilter),

    /// Search results for each FILTERED entry, in collection order
    ConfirmSearch {
        results: Vec<Vec<ContentRecord>>,
        comparator: Comparator,
    },

    /// FILTERED -> CONFIRMED for the side that was searched for
    ConfirmAll,

    /// Mark CONFIRMED entries with no counterpart in `other`
    CrossCompare {
        other: &'a [Entry],
        marker: Action,
        comparator: Comparator,
    },

    /// MARKED -> RESOLVED after the external action succeeded
    Resolve,
}

impl ReconcileEvent<'_> {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetContent(_) => "SET_CONTENT",
            Self::ApplyFilter(_) => "APPLY_FILTER",
            Self::ConfirmSearch { .. } => "CONFIRM_SEARCH",
            Self::ConfirmAll => "CONFIRM_ALL",
            Self::CrossCompare { .. } => "CROSS_COMPARE",
            Self::Resolve => "RESOLVE",
        }
    }
}

/// Serialized event as received from an external caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireEvent {
    SetContent {
        records: Vec<ContentRecord>,
    },

    ApplyFilter {
        filter: RecordFilter,
    },

    ConfirmSearch {
        results: Vec<Vec<ContentRecord>>,
        #[serde(default)]
        comparator: Comparator,
    },

    ConfirmAll,

    CrossCompare {
        other: Vec<Entry>,
        marker: Action,
        #[serde(default)]
        comparator: Comparator,
    },

    Resolve,

    /// Any type this build does not know about
    #[serde(other)]
    Unknown,
}

impl WireEvent {
    /// Typed view of this event; `None` for unknown types
    pub fn as_event(&self) -> Option<ReconcileEvent<'_>> {
        let event = match self {
            Self::SetContent { records } => ReconcileEvent::SetContent(records.clone()),
            Self::ApplyFilter { filter } => ReconcileEvent::ApplyFilter(*filter),
            Self::ConfirmSearch {
                results,
                comparator,
            } => ReconcileEvent::ConfirmSearch {
                results: results.clone(),
                comparator: *comparator,
            },
            Self::ConfirmAll => ReconcileEvent::ConfirmAll,
            Self::CrossCompare {
                other,
                marker,
                comparator,
            } => ReconcileEvent::CrossCompare {
                other,
                marker: *marker,
                comparator: *comparator,
            },
            Self::Resolve => ReconcileEvent::Resolve,
            Self::Unknown => return None,
        };
        Some(event)
    }
}
