//! Per-service record collection and its reducer.
//!
//! The collection is the only owner of its entries. Every transition is a
//! pure function of the current entries and one [`ReconcileEvent`]; the other
//! service's collection is only ever borrowed.

use serde::{Deserialize, Serialize};

use crate::core::crossref::cross_reference;

use super::events::{ReconcileEvent, WireEvent};
use super::record::{Action, Entry, Status};

/// Apply one event to a set of entries
pub fn reduce(entries: Vec<Entry>, event: ReconcileEvent<'_>) -> Vec<Entry> {
    match event {
        ReconcileEvent::SetContent(records) => records.into_iter().map(Entry::fetched).collect(),

        ReconcileEvent::ApplyFilter(filter) => entries
            .into_iter()
            .map(|mut e| {
                if e.status == Status::Fetched && filter.passes(&e.record) {
                    e.status = Status::Filtered;
                }
                e
            })
            .collect(),

        ReconcileEvent::ConfirmSearch {
            results,
            comparator,
        } => {
            let mut results = results.into_iter();
            entries
                .into_iter()
                .map(|mut e| {
                    if e.status != Status::Filtered {
                        return e;
                    }
                    let found = results.next().unwrap_or_default();

                    if found.is_empty() {
                        e.status = Status::Sought;
                    } else if let Some(j) = found.iter().position(|r| comparator.same(&e.record, r)) {
                        e.status = Status::Confirmed;
                        e.match_index = Some(j);
                    } else {
                        // Keep the top result as an unconfirmed best guess
                        e.status = Status::Found;
                        e.match_index = Some(0);
                    }
                    e.search_results = found;
                    e
                })
                .collect()
        }

        ReconcileEvent::ConfirmAll => entries
            .into_iter()
            .map(|mut e| {
                if e.status == Status::Filtered {
                    e.status = Status::Confirmed;
                }
                e
            })
            .collect(),

        ReconcileEvent::CrossCompare {
            other,
            marker,
            comparator,
        } => {
            let matches = cross_reference(&entries, other, &comparator);
            entries
                .into_iter()
                .zip(matches)
                .map(|(mut e, matched)| {
                    if e.status != Status::Confirmed {
                        return e;
                    }
                    match matched {
                        None => {
                            e.status = Status::Marked;
                            e.action = marker;
                        }
                        Some(idx) => {
                            e.cross_index = Some(idx);
                            e.status = if other[idx].status == Status::Found {
                                // Counterpart is only a best guess; leave for manual action
                                Status::Found
                            } else {
                                Status::Resolved
                            };
                        }
                    }
                    e
                })
                .collect()
        }

        ReconcileEvent::Resolve => entries
            .into_iter()
            .map(|mut e| {
                if e.status == Status::Marked {
                    e.status = Status::Resolved;
                    e.action = Action::None;
                }
                e
            })
            .collect(),
    }
}

/// Number of entries in each lifecycle bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    counts: [usize; 8],
}

impl StatusCounts {
    pub fn get(&self, status: Status) -> usize {
        self.counts[status.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Non-empty buckets in lifecycle order
    pub fn iter(&self) -> impl Iterator<Item = (Status, usize)> + '_ {
        Status::ALL
            .iter()
            .map(|s| (*s, self.counts[s.index()]))
            .filter(|(_, n)| *n > 0)
    }
}

/// The entries fetched from one service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCollection {
    entries: Vec<Entry>,
}

impl RecordCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply a typed event
    pub fn dispatch(&mut self, event: ReconcileEvent<'_>) {
        let entries = std::mem::take(&mut self.entries);
        self.entries = reduce(entries, event);
    }

    /// Apply an event received in serialized form; unknown types are no-ops
    pub fn dispatch_wire(&mut self, event: &WireEvent) {
        if let Some(event) = event.as_event() {
            self.dispatch(event);
        }
    }

    /// Entries at `status`, with their collection indices
    pub fn with_status(&self, status: Status) -> impl Iterator<Item = (usize, &Entry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.status == status)
    }

    /// Entries waiting on `action`
    pub fn marked(&self, action: Action) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(move |e| e.status == Status::Marked && e.action == action)
    }

    pub fn has_marked(&self, action: Action) -> bool {
        self.marked(action).next().is_some()
    }

    pub fn has_status(&self, status: Status) -> bool {
        self.entries.iter().any(|e| e.status == status)
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in &self.entries {
            counts.counts[entry.status.index()] += 1;
        }
        counts
    }
}
