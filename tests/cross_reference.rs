//! Cross-Reference Integration Tests
//!
//! Similarity contract and index-level matching between collections.

use chartsync::core::compare::{similarity, Comparator, DEFAULT_THRESHOLD};
use chartsync::core::crossref::{cross_reference, MIN_CROSS_STATUS};
use chartsync::domain::{ContentRecord, Entry, Status};

fn at(record: ContentRecord, status: Status) -> Entry {
    Entry {
        status,
        ..Entry::fetched(record)
    }
}

#[test]
fn test_similarity_contract() {
    let pairs = [
        ("Sigur Rós", "Sigur Ros"),
        ("The National", "National"),
        ("Boards of Canada", "Boards Of Canada"),
        ("Aphex Twin", "AFX"),
        ("", "Anything"),
    ];

    for (a, b) in pairs {
        let ab = similarity(a, b);
        assert_eq!(ab, similarity(b, a), "{} / {}", a, b);
        assert!((0.0..=1.0).contains(&ab), "{} / {} = {}", a, b, ab);
    }

    assert!(similarity("Sigur Rós", "Sigur Ros") >= DEFAULT_THRESHOLD);
    assert!(similarity("The National", "National") >= DEFAULT_THRESHOLD);
    assert!(similarity("Aphex Twin", "AFX") < DEFAULT_THRESHOLD);
}

#[test]
fn test_tracks_need_matching_artist() {
    let comparator = Comparator::default();
    let original = ContentRecord::track("Hurt", "Nine Inch Nails");
    let cover = ContentRecord::track("Hurt", "Johnny Cash");
    let same = ContentRecord::track("Hurt", "Nine Inch Nails").with_id("sp-hurt");

    assert!(!comparator.same(&original, &cover));
    assert!(comparator.same(&original, &same));
    assert!(!comparator.matches(Some(&original), None));
}

#[test]
fn test_confirmed_search_result_carries_identifier() {
    // Chart entry confirmed against a streaming-service search result
    let mut chart_entry = at(ContentRecord::artist("Beatles"), Status::Confirmed);
    chart_entry.search_results = vec![ContentRecord::artist("The Beatles").with_id("sp-1")];
    chart_entry.match_index = Some(0);

    // Library holds the same artist under a different display name
    let library = vec![
        at(ContentRecord::artist("Ringo's Band").with_id("sp-2"), Status::Confirmed),
        at(ContentRecord::artist("Fab Four").with_id("sp-1"), Status::Confirmed),
    ];

    let matches = cross_reference(&[chart_entry], &library, &Comparator::default());
    assert_eq!(matches, vec![Some(1)]);
}

#[test]
fn test_first_similar_counterpart_wins() {
    let from = vec![at(ContentRecord::artist("Nirvana"), Status::Confirmed)];
    let to = vec![
        at(ContentRecord::artist("Nirvana"), MIN_CROSS_STATUS),
        at(ContentRecord::artist("nirvana"), Status::Confirmed),
    ];

    let matches = cross_reference(&from, &to, &Comparator::default());
    assert_eq!(matches, vec![Some(0)]);
}

#[test]
fn test_entries_below_found_are_invisible() {
    let from = vec![
        at(ContentRecord::artist("Low"), Status::Confirmed),
        at(ContentRecord::artist("Slowdive"), Status::Filtered),
    ];
    let to = vec![
        at(ContentRecord::artist("Low"), Status::Sought),
        at(ContentRecord::artist("Slowdive"), Status::Confirmed),
    ];

    let matches = cross_reference(&from, &to, &Comparator::default());
    assert_eq!(matches, vec![None, None]);
}

#[test]
fn test_stricter_threshold() {
    let strict = Comparator::with_threshold(1.0);
    let from = vec![at(ContentRecord::artist("Beyoncé"), Status::Confirmed)];
    let to = vec![at(ContentRecord::artist("Beyonce!"), Status::Confirmed)];

    assert_eq!(cross_reference(&from, &to, &strict), vec![None]);
}
