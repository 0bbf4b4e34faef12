//! Reconciler Integration Tests
//!
//! Drives full runs against fake collaborators: fetch, compare, import and
//! clear, plus single-flight rejection, stale results and failure reporting.

mod common;

use std::sync::Arc;

use tokio::sync::Notify;

use chartsync::adapters::{MutateAction, ParseError, ServiceError};
use chartsync::core::limits::{Period, RunParams, ValidationError};
use chartsync::core::{ReconcileError, Stage, StageError, StageState};
use chartsync::domain::{Action, ContentKind, ContentRecord, Status};
use chartsync::{Reconciler, SearchDirection, Side, StageOutcome};

use common::{chart_records, context, library_records, standard_library, FakeChart, FakeLibrary};

fn status_of(reconciler: &Reconciler, side: Side, name: &str) -> Status {
    reconciler
        .collection(side)
        .unwrap()
        .entries()
        .iter()
        .find(|e| e.record.name == name)
        .unwrap()
        .status
}

#[tokio::test]
async fn test_full_run_marks_and_resolves() {
    let library = Arc::new(standard_library());
    let chart = Arc::new(FakeChart::new(chart_records()));
    let reconciler = Reconciler::new(library.clone(), chart);
    let ctx = context();

    let (l, c) = reconciler.refresh(&ctx).await;
    assert_eq!(l.unwrap(), StageOutcome::Applied);
    assert_eq!(c.unwrap(), StageOutcome::Applied);

    // Default minimum play count is 1, so the unplayed artist is not a candidate
    assert_eq!(status_of(&reconciler, Side::Chart, "Rare Act"), Status::Fetched);
    assert_eq!(reconciler.counts(Side::Chart).get(Status::Filtered), 3);
    assert_eq!(reconciler.counts(Side::Library).get(Status::Filtered), 3);

    let outcome = reconciler
        .compare(&ctx, SearchDirection::ChartInLibrary)
        .await
        .unwrap();
    assert_eq!(outcome, StageOutcome::Applied);
    assert_eq!(reconciler.progress(), 100);

    assert_eq!(status_of(&reconciler, Side::Chart, "Radiohead"), Status::Resolved);
    assert_eq!(status_of(&reconciler, Side::Chart, "Beatles"), Status::Resolved);
    assert_eq!(status_of(&reconciler, Side::Chart, "Muse"), Status::Marked);
    assert_eq!(status_of(&reconciler, Side::Library, "The Beatles"), Status::Resolved);
    assert_eq!(status_of(&reconciler, Side::Library, "Coldplay"), Status::Marked);

    let readiness = reconciler.readiness();
    assert!(readiness.import);
    assert!(readiness.clear);

    assert_eq!(reconciler.import(&ctx).await.unwrap(), StageOutcome::Applied);
    assert_eq!(reconciler.clear(&ctx).await.unwrap(), StageOutcome::Applied);

    assert_eq!(
        library.mutations(),
        vec![
            (MutateAction::Add, vec!["sp-muse".to_string()]),
            (MutateAction::Remove, vec!["sp-coldplay".to_string()]),
        ]
    );

    let muse = reconciler.collection(Side::Chart).unwrap();
    let muse = muse.entries().iter().find(|e| e.record.name == "Muse").unwrap();
    assert_eq!(muse.status, Status::Resolved);
    assert_eq!(muse.action, Action::None);

    let readiness = reconciler.readiness();
    assert!(!readiness.import);
    assert!(!readiness.clear);
    assert!(matches!(
        reconciler.import(&ctx).await,
        Err(ReconcileError::NotReady { stage: Stage::Import, .. })
    ));
}

#[tokio::test]
async fn test_import_batches_ids() {
    let names: Vec<String> = (0..120).map(|i| format!("Band {:03}", i)).collect();

    let mut library = FakeLibrary::new(vec![ContentRecord::artist("Someone").with_id("sp-someone")]);
    for name in &names {
        library = library.with_result(
            name,
            vec![ContentRecord::artist(name.as_str()).with_id(format!("sp-{}", name))],
        );
    }
    let library = Arc::new(library);
    let chart = Arc::new(FakeChart::new(
        names.iter().map(|n| ContentRecord::artist(n.as_str())).collect(),
    ));

    let reconciler = Reconciler::new(library.clone(), chart);
    let ctx = context();
    reconciler.refresh(&ctx).await;
    reconciler
        .compare(&ctx, SearchDirection::ChartInLibrary)
        .await
        .unwrap();

    assert_eq!(reconciler.counts(Side::Chart).get(Status::Marked), 120);
    reconciler.import(&ctx).await.unwrap();

    let sizes: Vec<usize> = library.mutations().iter().map(|(_, ids)| ids.len()).collect();
    assert_eq!(sizes, vec![50, 50, 20]);
    assert_eq!(reconciler.counts(Side::Chart).get(Status::Resolved), 120);
}

#[tokio::test]
async fn test_second_fetch_rejected_while_in_flight() {
    let gate = Arc::new(Notify::new());
    let library = Arc::new(standard_library().with_gate(gate.clone()));
    let chart = Arc::new(FakeChart::new(chart_records()));
    let reconciler = Reconciler::new(library, chart);
    let ctx = context();

    let (first, second) = tokio::join!(reconciler.fetch_library(&ctx), async {
        let second = reconciler.fetch_library(&ctx).await;
        gate.notify_one();
        second
    });

    assert_eq!(first.unwrap(), StageOutcome::Applied);
    assert_eq!(
        second.unwrap_err(),
        ReconcileError::AlreadyRunning(Stage::FetchLibrary)
    );
    assert_eq!(reconciler.stage_state(Stage::FetchLibrary), StageState::Succeeded);
    assert_eq!(reconciler.collection(Side::Library).unwrap().len(), 3);
}

#[tokio::test]
async fn test_stale_fetch_discarded_after_param_change() {
    let gate = Arc::new(Notify::new());
    let library = Arc::new(standard_library());
    let chart = Arc::new(FakeChart::new(chart_records()).with_gate(gate.clone()));
    let reconciler = Reconciler::new(library, chart);
    let ctx = context();

    let changed = RunParams {
        period: Period::Year,
        ..RunParams::default()
    };

    let (outcome, _) = tokio::join!(reconciler.fetch_chart(&ctx), async {
        assert!(reconciler.set_params(changed).unwrap());
        gate.notify_one();
    });

    assert_eq!(outcome.unwrap(), StageOutcome::Discarded);
    assert!(reconciler.collection(Side::Chart).is_none());
    assert_eq!(reconciler.stage_state(Stage::FetchChart), StageState::Idle);

    // Re-fetching under the new parameters applies normally
    gate.notify_one();
    assert_eq!(
        reconciler.fetch_chart(&ctx).await.unwrap(),
        StageOutcome::Applied
    );
}

#[tokio::test]
async fn test_param_change_disables_actions() {
    let reconciler = Reconciler::new(
        Arc::new(standard_library()),
        Arc::new(FakeChart::new(chart_records())),
    );
    let ctx = context();
    reconciler.refresh(&ctx).await;
    reconciler
        .compare(&ctx, SearchDirection::ChartInLibrary)
        .await
        .unwrap();
    assert!(reconciler.readiness().import);

    // Unchanged parameters are not a change
    assert!(!reconciler.set_params(RunParams::default()).unwrap());
    assert!(reconciler.readiness().import);

    let changed = RunParams {
        min_play_count: 20,
        ..RunParams::default()
    };
    assert!(reconciler.set_params(changed).unwrap());
    assert!(!reconciler.readiness().import);
    assert!(!reconciler.readiness().clear);
}

#[tokio::test]
async fn test_compare_refuses_collections_from_old_params() {
    let library = Arc::new(standard_library());
    let reconciler = Reconciler::new(library.clone(), Arc::new(FakeChart::new(chart_records())));
    let ctx = context();
    reconciler.refresh(&ctx).await;

    let changed = RunParams {
        kind: ContentKind::Album,
        min_play_count: 40,
        ..RunParams::default()
    };
    assert!(reconciler.set_params(changed).unwrap());

    // Artists fetched under the old kind must not be compared and imported as albums
    assert!(matches!(
        reconciler.compare(&ctx, SearchDirection::ChartInLibrary).await,
        Err(ReconcileError::NotReady { stage: Stage::Search, .. })
    ));
    assert!(!reconciler.readiness().import);
    assert!(!reconciler.readiness().clear);
    assert!(matches!(
        reconciler.import(&ctx).await,
        Err(ReconcileError::NotReady { stage: Stage::Import, .. })
    ));
    assert!(library.mutations().is_empty());

    // Only one side re-fetched is still not enough
    reconciler.fetch_chart(&ctx).await.unwrap();
    assert!(matches!(
        reconciler.compare(&ctx, SearchDirection::ChartInLibrary).await,
        Err(ReconcileError::NotReady { stage: Stage::Search, .. })
    ));

    reconciler.fetch_library(&ctx).await.unwrap();
    assert_eq!(
        reconciler
            .compare(&ctx, SearchDirection::ChartInLibrary)
            .await
            .unwrap(),
        StageOutcome::Applied
    );
}

#[tokio::test]
async fn test_second_compare_rejected_while_in_flight() {
    let gate = Arc::new(Notify::new());
    let library = Arc::new(standard_library().with_search_gate(gate.clone()));
    let reconciler = Reconciler::new(library, Arc::new(FakeChart::new(chart_records())));
    let ctx = context();
    reconciler.refresh(&ctx).await;

    let (first, second) = tokio::join!(
        reconciler.compare(&ctx, SearchDirection::ChartInLibrary),
        async {
            let second = reconciler
                .compare(&ctx, SearchDirection::ChartInLibrary)
                .await;
            gate.notify_one();
            second
        }
    );

    assert_eq!(first.unwrap(), StageOutcome::Applied);
    assert_eq!(second.unwrap_err(), ReconcileError::AlreadyRunning(Stage::Search));
    assert_eq!(reconciler.stage_state(Stage::Search), StageState::Succeeded);
    assert!(reconciler.readiness().import);
}

#[tokio::test]
async fn test_second_mutation_rejected_while_in_flight() {
    let gate = Arc::new(Notify::new());
    let library = Arc::new(standard_library().with_mutate_gate(gate.clone()));
    let reconciler = Reconciler::new(library.clone(), Arc::new(FakeChart::new(chart_records())));
    let ctx = context();
    reconciler.refresh(&ctx).await;
    reconciler
        .compare(&ctx, SearchDirection::ChartInLibrary)
        .await
        .unwrap();

    let (first, second) = tokio::join!(reconciler.import(&ctx), async {
        assert!(!reconciler.readiness().import);
        let second = reconciler.import(&ctx).await;
        gate.notify_one();
        second
    });
    assert_eq!(first.unwrap(), StageOutcome::Applied);
    assert_eq!(second.unwrap_err(), ReconcileError::AlreadyRunning(Stage::Import));

    let (first, second) = tokio::join!(reconciler.clear(&ctx), async {
        assert!(!reconciler.readiness().clear);
        let second = reconciler.clear(&ctx).await;
        gate.notify_one();
        second
    });
    assert_eq!(first.unwrap(), StageOutcome::Applied);
    assert_eq!(second.unwrap_err(), ReconcileError::AlreadyRunning(Stage::Clear));

    assert_eq!(
        library.mutations(),
        vec![
            (MutateAction::Add, vec!["sp-muse".to_string()]),
            (MutateAction::Remove, vec!["sp-coldplay".to_string()]),
        ]
    );
}

#[tokio::test]
async fn test_stale_search_discarded_after_param_change() {
    let gate = Arc::new(Notify::new());
    let library = Arc::new(standard_library().with_search_gate(gate.clone()));
    let reconciler = Reconciler::new(library, Arc::new(FakeChart::new(chart_records())));
    let ctx = context();
    reconciler.refresh(&ctx).await;

    let changed = RunParams {
        min_play_count: 20,
        ..RunParams::default()
    };
    let (outcome, _) = tokio::join!(
        reconciler.compare(&ctx, SearchDirection::ChartInLibrary),
        async {
            assert!(reconciler.set_params(changed).unwrap());
            gate.notify_one();
        }
    );

    assert_eq!(outcome.unwrap(), StageOutcome::Discarded);
    assert_eq!(reconciler.stage_state(Stage::Search), StageState::Idle);
    assert_eq!(reconciler.counts(Side::Chart).get(Status::Filtered), 3);
    assert_eq!(reconciler.counts(Side::Chart).get(Status::Marked), 0);
    assert_eq!(reconciler.counts(Side::Library).get(Status::Filtered), 3);
    assert!(!reconciler.readiness().import);
    assert!(!reconciler.readiness().clear);
}

#[tokio::test]
async fn test_stale_search_discarded_after_refetch() {
    let gate = Arc::new(Notify::new());
    let library = Arc::new(standard_library().with_search_gate(gate.clone()));
    let reconciler = Reconciler::new(library, Arc::new(FakeChart::new(chart_records())));
    let ctx = context();
    reconciler.refresh(&ctx).await;

    let (outcome, refetch) = tokio::join!(
        reconciler.compare(&ctx, SearchDirection::ChartInLibrary),
        async {
            let refetch = reconciler.fetch_library(&ctx).await;
            gate.notify_one();
            refetch
        }
    );

    assert_eq!(refetch.unwrap(), StageOutcome::Applied);
    assert_eq!(outcome.unwrap(), StageOutcome::Discarded);
    assert_eq!(reconciler.stage_state(Stage::Search), StageState::Idle);
    assert_eq!(reconciler.counts(Side::Chart).get(Status::Filtered), 3);
    assert_eq!(reconciler.counts(Side::Library).get(Status::Filtered), 3);
    assert!(!reconciler.readiness().import);

    // Same parameters, fresh content: a new compare goes through
    gate.notify_one();
    assert_eq!(
        reconciler
            .compare(&ctx, SearchDirection::ChartInLibrary)
            .await
            .unwrap(),
        StageOutcome::Applied
    );
}

#[tokio::test]
async fn test_invalid_params_rejected() {
    let reconciler = Reconciler::new(
        Arc::new(standard_library()),
        Arc::new(FakeChart::new(chart_records())),
    );
    let too_many = RunParams {
        limit: 1001,
        ..RunParams::default()
    };
    assert!(matches!(
        reconciler.set_params(too_many),
        Err(ValidationError::ExceedsMaximum { .. })
    ));
    assert_eq!(reconciler.params(), RunParams::default());
}

#[tokio::test]
async fn test_parse_failure_leaves_collection_unset() {
    let library = Arc::new(FakeLibrary::failing(
        ParseError::missing("name", "artist").into(),
    ));
    let chart = Arc::new(FakeChart::new(chart_records()));
    let reconciler = Reconciler::new(library, chart);
    let ctx = context();

    let (l, c) = reconciler.refresh(&ctx).await;
    assert_eq!(l.unwrap(), StageOutcome::Failed);
    assert_eq!(c.unwrap(), StageOutcome::Applied);

    assert!(reconciler.collection(Side::Library).is_none());
    assert!(reconciler.collection(Side::Chart).is_some());

    let state = reconciler.stage_state(Stage::FetchLibrary);
    assert!(state.error().unwrap().is_parse_error());

    assert!(matches!(
        reconciler.compare(&ctx, SearchDirection::ChartInLibrary).await,
        Err(ReconcileError::NotReady { stage: Stage::Search, .. })
    ));
}

#[tokio::test]
async fn test_expired_auth_and_rate_limit_hints() {
    let library = Arc::new(FakeLibrary {
        search_error: Some(ServiceError::from_status(429, "slow down")),
        ..standard_library()
    });
    let chart = Arc::new(FakeChart::new(chart_records()));
    let reconciler = Reconciler::new(library, chart);
    let ctx = context();
    reconciler.refresh(&ctx).await;

    let outcome = reconciler
        .compare(&ctx, SearchDirection::ChartInLibrary)
        .await
        .unwrap();
    assert_eq!(outcome, StageOutcome::Failed);

    let search = reconciler.stage_state(Stage::Search);
    let error = search.error().unwrap();
    assert!(error.is_rate_limited());
    assert!(error.hint().is_some());

    // Collections are left as they were before the search
    assert_eq!(reconciler.counts(Side::Chart).get(Status::Filtered), 3);

    let expired = Reconciler::new(
        Arc::new(standard_library()),
        Arc::new(FakeChart::failing(ServiceError::from_status(401, "expired"))),
    );
    expired.fetch_chart(&ctx).await.unwrap();
    let state = expired.stage_state(Stage::FetchChart);
    assert!(state.error().unwrap().is_auth_expired());
    assert!(state.error().unwrap().hint().unwrap().contains("sign in"));
}

#[tokio::test]
async fn test_missing_chart_username_reported() {
    let chart = Arc::new(FakeChart::failing(
        ValidationError::MissingOption {
            name: "username".into(),
        }
        .into(),
    ));
    let reconciler = Reconciler::new(Arc::new(standard_library()), chart);
    reconciler.fetch_chart(&context()).await.unwrap();

    assert!(matches!(
        reconciler.stage_state(Stage::FetchChart),
        StageState::Failed(StageError::MissingIdentity { .. })
    ));
}

#[tokio::test]
async fn test_cross_compare_skipped_without_confirmed_entries() {
    let library = Arc::new(FakeLibrary::new(Vec::new()));
    let chart = Arc::new(FakeChart::new(chart_records()));
    let reconciler = Reconciler::new(library, chart);
    let ctx = context();
    reconciler.refresh(&ctx).await;

    // Empty library: nothing can be confirmed by search either
    let outcome = reconciler
        .compare(&ctx, SearchDirection::ChartInLibrary)
        .await
        .unwrap();
    assert_eq!(outcome, StageOutcome::Applied);

    assert_eq!(reconciler.counts(Side::Chart).get(Status::Sought), 3);
    assert_eq!(reconciler.counts(Side::Chart).get(Status::Marked), 0);
    assert!(!reconciler.readiness().import);
    assert!(!reconciler.readiness().clear);
}

#[tokio::test]
async fn test_reverse_direction_searches_chart() {
    let chart = FakeChart::new(chart_records())
        .with_result("Radiohead", vec![ContentRecord::artist("Radiohead")])
        .with_result("The Beatles", vec![ContentRecord::artist("Beatles")]);
    let reconciler = Reconciler::new(Arc::new(standard_library()), Arc::new(chart));
    let ctx = context();
    reconciler.refresh(&ctx).await;

    reconciler
        .compare(&ctx, SearchDirection::LibraryInChart)
        .await
        .unwrap();

    assert_eq!(status_of(&reconciler, Side::Library, "Radiohead"), Status::Resolved);
    assert_eq!(status_of(&reconciler, Side::Library, "The Beatles"), Status::Resolved);
    // No chart result means no evidence either way
    assert_eq!(status_of(&reconciler, Side::Library, "Coldplay"), Status::Sought);

    // Muse is missing from the library but has no library id to import with
    assert_eq!(status_of(&reconciler, Side::Chart, "Muse"), Status::Marked);
    assert!(!reconciler.readiness().import);
    assert!(!reconciler.readiness().clear);
}

#[tokio::test]
async fn test_failed_mutation_keeps_marks() {
    let library = Arc::new(FakeLibrary {
        mutate_error: Some(ServiceError::from_status(503, "down")),
        ..standard_library()
    });
    let reconciler = Reconciler::new(library, Arc::new(FakeChart::new(chart_records())));
    let ctx = context();
    reconciler.refresh(&ctx).await;
    reconciler
        .compare(&ctx, SearchDirection::ChartInLibrary)
        .await
        .unwrap();

    assert_eq!(reconciler.import(&ctx).await.unwrap(), StageOutcome::Failed);
    assert_eq!(status_of(&reconciler, Side::Chart, "Muse"), Status::Marked);
    assert!(reconciler.readiness().import);

    let snapshot = reconciler.snapshot();
    assert!(snapshot.stage(Stage::Import).error().is_some());
    assert_eq!(snapshot.counts(Side::Chart).get(Status::Marked), 1);
}

#[test]
fn test_library_fixture_ids() {
    assert!(library_records().iter().all(|r| r.external_id.is_some()));
}
