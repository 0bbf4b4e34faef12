//! Index-level set difference between the two collections.
//!
//! Entries are compared through [`Entry::comparison_key`], so a chart entry
//! whose search confirmed a library-service record is compared using that
//! record's identifier. The relation is computed per direction; callers run
//! it once for each side.

use std::collections::HashMap;

use crate::domain::{Entry, Status};

use super::compare::{same_identity, Comparator};

/// Entries below this status take no part in cross-referencing
pub const MIN_CROSS_STATUS: Status = Status::Found;

/// For each entry of `from`, the index of its counterpart in `to`.
///
/// Only entries at [`MIN_CROSS_STATUS`] or later are considered on either
/// side. An identifier match wins outright; otherwise the first entry of
/// `to` that matches (by identifier when both carry one, by similarity when
/// not) is taken.
pub fn cross_reference(from: &[Entry], to: &[Entry], comparator: &Comparator) -> Vec<Option<usize>> {
    let eligible: Vec<(usize, &Entry)> = to
        .iter()
        .enumerate()
        .filter(|(_, e)| e.status >= MIN_CROSS_STATUS)
        .collect();

    let mut by_id: HashMap<&str, usize> = HashMap::new();
    for (idx, entry) in &eligible {
        if let Some(id) = entry.comparison_key().external_id.as_deref() {
            by_id.entry(id).or_insert(*idx);
        }
    }

    from.iter()
        .map(|entry| {
            if entry.status < MIN_CROSS_STATUS {
                return None;
            }
            let key = entry.comparison_key();

            if let Some(idx) = key.external_id.as_deref().and_then(|id| by_id.get(id)) {
                return Some(*idx);
            }

            eligible
                .iter()
                .find(|(_, other)| {
                    let other_key = other.comparison_key();
                    if key.external_id.is_some() && other_key.external_id.is_some() {
                        same_identity(Some(key), Some(other_key))
                    } else {
                        comparator.same(key, other_key)
                    }
                })
                .map(|(idx, _)| *idx)
        })
        .collect()
}
