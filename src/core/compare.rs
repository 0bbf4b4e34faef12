//! Fuzzy identity comparison between records from different services.
//!
//! Names are folded (case, diacritics, a leading "the") and scored with the
//! Sørensen-Dice bigram coefficient, which is symmetric and lies in [0, 1].

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::domain::{ContentKind, ContentRecord};

/// Minimum similarity for two names to denote the same entity
pub const DEFAULT_THRESHOLD: f64 = 0.90;

/// Similarity comparator used to confirm search results and cross-reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparator {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Default for Comparator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Comparator {
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Do `own` and `candidate` denote the same artist, album or track?
    ///
    /// Albums and tracks must also agree on their first credited artist.
    /// Absent arguments never match.
    pub fn matches(&self, own: Option<&ContentRecord>, candidate: Option<&ContentRecord>) -> bool {
        let (Some(own), Some(candidate)) = (own, candidate) else {
            return false;
        };

        if !self.names_match(&own.name, &candidate.name) {
            return false;
        }

        match own.kind {
            ContentKind::Artist => true,
            ContentKind::Album | ContentKind::Track => {
                match (own.primary_artist(), candidate.primary_artist()) {
                    (Some(a), Some(b)) => self.names_match(a, b),
                    _ => false,
                }
            }
        }
    }

    /// Convenience for the common case where both records are present
    pub fn same(&self, own: &ContentRecord, candidate: &ContentRecord) -> bool {
        self.matches(Some(own), Some(candidate))
    }

    fn names_match(&self, a: &str, b: &str) -> bool {
        similarity(a, b) >= self.threshold
    }
}

/// Exact identifier equality; both records must carry one.
///
/// Only meaningful when both ids come from the same service.
pub fn same_identity(a: Option<&ContentRecord>, b: Option<&ContentRecord>) -> bool {
    match (
        a.and_then(|r| r.external_id.as_deref()),
        b.and_then(|r| r.external_id.as_deref()),
    ) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Normalized name similarity in [0, 1]
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = fold(a);
    let b = fold(b);

    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    strsim::sorensen_dice(&a, &b)
}

/// Lowercase, strip diacritics and a leading article, collapse whitespace
fn fold(name: &str) -> String {
    let stripped: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    let words: Vec<&str> = stripped.split_whitespace().collect();
    let words = match words.as_slice() {
        ["the", rest @ ..] if !rest.is_empty() => rest,
        all => all,
    };

    words.join(" ")
}
