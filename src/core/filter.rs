//! Candidate filters applied right after a fetch.

use serde::{Deserialize, Serialize};

use crate::domain::ContentRecord;

/// Predicate deciding which fetched records become candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RecordFilter {
    /// Every record passes
    All,

    /// Chart records need at least `threshold` plays; records without a
    /// play count (library records) always pass
    MinPlayCount { threshold: u64 },
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self::All
    }
}

impl RecordFilter {
    pub fn min_play_count(threshold: u64) -> Self {
        Self::MinPlayCount { threshold }
    }

    pub fn passes(&self, record: &ContentRecord) -> bool {
        match self {
            Self::All => true,
            Self::MinPlayCount { threshold } => match record.play_count {
                Some(plays) => plays >= *threshold,
                None => true,
            },
        }
    }
}
