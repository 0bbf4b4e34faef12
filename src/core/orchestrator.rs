//! Reconciliation orchestrator.
//!
//! Sequences fetch, filter, search, confirm, cross-compare and the two
//! mutating actions against the library and chart collaborators. Each stage
//! records its outcome as [`StageState`] instead of failing the whole run, so
//! one side can succeed while the other has failed.
//!
//! The state mutex is only held for synchronous reducer work; it is never
//! held across a call to a collaborator.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    mutate_in_batches, ContentService, Credential, FetchOptions, LibraryService, MutateAction,
    ServiceError,
};
use crate::domain::{
    Action, ContentRecord, Entry, RecordCollection, ReconcileEvent, Status, StatusCounts,
};

use super::compare::Comparator;
use super::filter::RecordFilter;
use super::limits::{RunParams, ValidationError, LIBRARY_MAX_PAGE};
use super::stage::{Stage, StageError, StageState};

/// Which service a collection came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Library,
    Chart,
}

/// Which catalog is searched for whose candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchDirection {
    /// Search the library service's catalog for chart candidates
    #[default]
    ChartInLibrary,

    /// Search the chart service's catalog for library candidates
    LibraryInChart,
}

impl SearchDirection {
    /// The side whose candidates are searched for
    pub fn searched(self) -> Side {
        match self {
            Self::ChartInLibrary => Side::Chart,
            Self::LibraryInChart => Side::Library,
        }
    }
}

/// Credentials for one stage invocation
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub library: Credential,
    pub chart: Credential,
}

/// What happened to a stage's result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Applied to the collections
    Applied,

    /// Arrived after the parameters or content changed; dropped
    Discarded,

    /// Recorded as a failure on the stage
    Failed,
}

/// A trigger that was rejected without side effects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("{0} is already running")]
    AlreadyRunning(Stage),

    #[error("Cannot start {stage}: {reason}")]
    NotReady { stage: Stage, reason: String },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Whether each mutating action may be triggered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub import: bool,
    pub clear: bool,
}

#[derive(Debug, Default)]
struct SideState {
    collection: Option<RecordCollection>,
    fetch: StageState,
    fetched_at: Option<DateTime<Utc>>,

    /// Parameter generation the collection was fetched under
    generation: u64,
}

#[derive(Debug, Default)]
struct ReconcileState {
    params: RunParams,

    /// Bumped whenever the parameters change
    generation: u64,

    /// Bumped whenever either collection is replaced
    revision: u64,

    /// (generation, revision) of the last completed cross-compare
    compared: Option<(u64, u64)>,

    library: SideState,
    chart: SideState,
    search: StageState,
    import: StageState,
    clear: StageState,
    progress: u8,
}

impl ReconcileState {
    fn side(&self, side: Side) -> &SideState {
        match side {
            Side::Library => &self.library,
            Side::Chart => &self.chart,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideState {
        match side {
            Side::Library => &mut self.library,
            Side::Chart => &mut self.chart,
        }
    }

    fn stage(&self, stage: Stage) -> &StageState {
        match stage {
            Stage::FetchLibrary => &self.library.fetch,
            Stage::FetchChart => &self.chart.fetch,
            Stage::Search => &self.search,
            Stage::Import => &self.import,
            Stage::Clear => &self.clear,
        }
    }

    fn stage_mut(&mut self, stage: Stage) -> &mut StageState {
        match stage {
            Stage::FetchLibrary => &mut self.library.fetch,
            Stage::FetchChart => &mut self.chart.fetch,
            Stage::Search => &mut self.search,
            Stage::Import => &mut self.import,
            Stage::Clear => &mut self.clear,
        }
    }

    fn epoch(&self) -> (u64, u64) {
        (self.generation, self.revision)
    }

    fn is_current(&self) -> bool {
        self.compared == Some(self.epoch())
    }

    /// Library-service ids of chart entries waiting to be imported
    fn import_ids(&self) -> Vec<String> {
        self.chart
            .collection
            .iter()
            .flat_map(|c| c.marked(Action::Import))
            .filter_map(|e| e.matched().and_then(|m| m.external_id.clone()))
            .collect()
    }

    /// Library ids of entries waiting to be cleared
    fn clear_ids(&self) -> Vec<String> {
        self.library
            .collection
            .iter()
            .flat_map(|c| c.marked(Action::Clear))
            .filter_map(|e| e.record.external_id.clone())
            .collect()
    }

    fn readiness(&self) -> Readiness {
        if !self.is_current() {
            return Readiness::default();
        }
        Readiness {
            import: !self.import.is_loading() && !self.import_ids().is_empty(),
            clear: !self.clear.is_loading() && !self.clear_ids().is_empty(),
        }
    }
}

/// Point-in-time view for the presentation layer
#[derive(Debug, Clone)]
pub struct ReconcileSnapshot {
    pub run_id: Uuid,
    pub params: RunParams,
    pub library: Option<RecordCollection>,
    pub chart: Option<RecordCollection>,
    pub library_fetched_at: Option<DateTime<Utc>>,
    pub chart_fetched_at: Option<DateTime<Utc>>,
    pub fetch_library: StageState,
    pub fetch_chart: StageState,
    pub search: StageState,
    pub import: StageState,
    pub clear: StageState,
    pub progress: u8,
    pub readiness: Readiness,
}

impl ReconcileSnapshot {
    pub fn collection(&self, side: Side) -> Option<&RecordCollection> {
        match side {
            Side::Library => self.library.as_ref(),
            Side::Chart => self.chart.as_ref(),
        }
    }

    pub fn counts(&self, side: Side) -> StatusCounts {
        self.collection(side)
            .map(RecordCollection::counts)
            .unwrap_or_default()
    }

    pub fn stage(&self, stage: Stage) -> &StageState {
        match stage {
            Stage::FetchLibrary => &self.fetch_library,
            Stage::FetchChart => &self.fetch_chart,
            Stage::Search => &self.search,
            Stage::Import => &self.import,
            Stage::Clear => &self.clear,
        }
    }
}

/// Drives one reconciliation between a library and a chart
pub struct Reconciler {
    run_id: Uuid,
    library: Arc<dyn LibraryService>,
    chart: Arc<dyn ContentService>,
    comparator: Comparator,
    state: Mutex<ReconcileState>,
}

impl Reconciler {
    /// Create a reconciler with default parameters
    pub fn new(library: Arc<dyn LibraryService>, chart: Arc<dyn ContentService>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            library,
            chart,
            comparator: Comparator::default(),
            state: Mutex::new(ReconcileState::default()),
        }
    }

    /// Use a custom similarity comparator
    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn lock(&self) -> MutexGuard<'_, ReconcileState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn params(&self) -> RunParams {
        self.lock().params
    }

    /// Change the run parameters.
    ///
    /// A change disables both mutating actions until the pipeline is re-run,
    /// and results of calls already in flight are discarded on arrival.
    /// Returns whether anything changed.
    pub fn set_params(&self, params: RunParams) -> Result<bool, ValidationError> {
        params.validate()?;

        let mut state = self.lock();
        if state.params == params {
            return Ok(false);
        }
        state.params = params;
        state.generation += 1;
        info!(
            run_id = %self.run_id,
            generation = state.generation,
            kind = %params.kind,
            period = %params.period,
            limit = params.limit,
            min_play_count = params.min_play_count,
            "Run parameters changed"
        );
        Ok(true)
    }

    pub fn readiness(&self) -> Readiness {
        self.lock().readiness()
    }

    /// Search progress, 0-100
    pub fn progress(&self) -> u8 {
        self.lock().progress
    }

    pub fn stage_state(&self, stage: Stage) -> StageState {
        self.lock().stage(stage).clone()
    }

    pub fn collection(&self, side: Side) -> Option<RecordCollection> {
        self.lock().side(side).collection.clone()
    }

    pub fn counts(&self, side: Side) -> StatusCounts {
        self.lock()
            .side(side)
            .collection
            .as_ref()
            .map(RecordCollection::counts)
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> ReconcileSnapshot {
        let state = self.lock();
        ReconcileSnapshot {
            run_id: self.run_id,
            params: state.params,
            library: state.library.collection.clone(),
            chart: state.chart.collection.clone(),
            library_fetched_at: state.library.fetched_at,
            chart_fetched_at: state.chart.fetched_at,
            fetch_library: state.library.fetch.clone(),
            fetch_chart: state.chart.fetch.clone(),
            search: state.search.clone(),
            import: state.import.clone(),
            clear: state.clear.clone(),
            progress: state.progress,
            readiness: state.readiness(),
        }
    }

    /// Mark a stage as loading, rejecting a second concurrent trigger
    fn begin(&self, state: &mut ReconcileState, stage: Stage) -> Result<(), ReconcileError> {
        if state.stage(stage).is_loading() {
            warn!(run_id = %self.run_id, %stage, "Rejected trigger, stage already in flight");
            return Err(ReconcileError::AlreadyRunning(stage));
        }
        *state.stage_mut(stage) = StageState::Loading;
        Ok(())
    }

    /// Fetch both sides concurrently
    pub async fn refresh(
        &self,
        ctx: &RunContext,
    ) -> (
        Result<StageOutcome, ReconcileError>,
        Result<StageOutcome, ReconcileError>,
    ) {
        tokio::join!(self.fetch_library(ctx), self.fetch_chart(ctx))
    }

    /// Fetch the library and filter it into candidates
    #[instrument(skip(self, ctx), fields(run_id = %self.run_id))]
    pub async fn fetch_library(&self, ctx: &RunContext) -> Result<StageOutcome, ReconcileError> {
        let (generation, params) = {
            let mut state = self.lock();
            self.begin(&mut state, Stage::FetchLibrary)?;
            (state.generation, state.params)
        };

        let options = FetchOptions {
            kind: params.kind,
            limit: LIBRARY_MAX_PAGE,
            period: None,
        };
        let result = self.library.fetch(&ctx.library, &options).await;
        Ok(self.finish_fetch(Side::Library, generation, result))
    }

    /// Fetch the chart and filter it into candidates
    #[instrument(skip(self, ctx), fields(run_id = %self.run_id))]
    pub async fn fetch_chart(&self, ctx: &RunContext) -> Result<StageOutcome, ReconcileError> {
        let (generation, params) = {
            let mut state = self.lock();
            self.begin(&mut state, Stage::FetchChart)?;
            (state.generation, state.params)
        };

        let options = FetchOptions {
            kind: params.kind,
            limit: params.limit,
            period: Some(params.period),
        };
        let result = self.chart.fetch(&ctx.chart, &options).await;
        Ok(self.finish_fetch(Side::Chart, generation, result))
    }

    fn finish_fetch(
        &self,
        side: Side,
        generation: u64,
        result: Result<Vec<ContentRecord>, ServiceError>,
    ) -> StageOutcome {
        let service = match side {
            Side::Library => self.library.name().to_string(),
            Side::Chart => self.chart.name().to_string(),
        };

        let mut state = self.lock();
        if state.generation != generation {
            debug!(?side, "Discarding fetch result for outdated parameters");
            state.side_mut(side).fetch = StageState::Idle;
            return StageOutcome::Discarded;
        }

        let filter = RecordFilter::min_play_count(state.params.min_play_count);
        state.revision += 1;

        match result {
            Ok(records) => {
                let mut collection = RecordCollection::new();
                collection.dispatch(ReconcileEvent::SetContent(records));
                collection.dispatch(ReconcileEvent::ApplyFilter(filter));
                info!(
                    ?side,
                    total = collection.len(),
                    candidates = collection.counts().get(Status::Filtered),
                    "Collection fetched"
                );

                let side_state = state.side_mut(side);
                side_state.collection = Some(collection);
                side_state.fetch = StageState::Succeeded;
                side_state.fetched_at = Some(Utc::now());
                side_state.generation = generation;
                StageOutcome::Applied
            }
            Err(e) => {
                error!(?side, error = %e, "Fetch failed");
                let side_state = state.side_mut(side);
                side_state.collection = None;
                side_state.fetch = StageState::Failed(StageError::from_service(&service, e));
                StageOutcome::Failed
            }
        }
    }

    /// Search, confirm and cross-compare.
    ///
    /// Candidates of the searched side are looked up in the other service's
    /// catalog; the other side is taken as ground truth. Cross-compare only
    /// runs once both sides hold a confirmed entry.
    #[instrument(skip(self, ctx), fields(run_id = %self.run_id))]
    pub async fn compare(
        &self,
        ctx: &RunContext,
        direction: SearchDirection,
    ) -> Result<StageOutcome, ReconcileError> {
        let searched = direction.searched();

        let (epoch, candidates) = {
            let mut state = self.lock();
            if state.search.is_loading() {
                return Err(ReconcileError::AlreadyRunning(Stage::Search));
            }
            let Some(collection) = state.side(searched).collection.as_ref() else {
                return Err(not_ready(Stage::Search, "both collections must be fetched first"));
            };
            if state.side(other(searched)).collection.is_none() {
                return Err(not_ready(Stage::Search, "both collections must be fetched first"));
            }
            if state.library.generation != state.generation
                || state.chart.generation != state.generation
            {
                return Err(not_ready(Stage::Search, "parameters changed; re-fetch"));
            }

            let candidates: Vec<ContentRecord> = collection
                .with_status(Status::Filtered)
                .map(|(_, e)| e.record.clone())
                .collect();

            self.begin(&mut state, Stage::Search)?;
            state.progress = 0;
            (state.epoch(), candidates)
        };

        info!(?direction, candidates = candidates.len(), "Searching other service");
        let progress = |percent: u8| self.lock().progress = percent;
        let result = match direction {
            SearchDirection::ChartInLibrary => {
                self.library.search(&ctx.library, &candidates, &progress).await
            }
            SearchDirection::LibraryInChart => {
                self.chart.search(&ctx.chart, &candidates, &progress).await
            }
        };

        let mut state = self.lock();
        if state.epoch() != epoch {
            debug!("Discarding search results for outdated parameters or content");
            state.search = StageState::Idle;
            return Ok(StageOutcome::Discarded);
        }

        let results = match result {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "Search failed");
                let service = match direction {
                    SearchDirection::ChartInLibrary => self.library.name(),
                    SearchDirection::LibraryInChart => self.chart.name(),
                };
                state.search = StageState::Failed(StageError::from_service(service, e));
                return Ok(StageOutcome::Failed);
            }
        };

        let comparator = self.comparator;
        if let Some(c) = state.side_mut(searched).collection.as_mut() {
            c.dispatch(ReconcileEvent::ConfirmSearch {
                results,
                comparator,
            });
        }
        if let Some(c) = state.side_mut(other(searched)).collection.as_mut() {
            c.dispatch(ReconcileEvent::ConfirmAll);
        }

        self.cross_compare(&mut state, epoch);
        state.search = StageState::Succeeded;
        state.progress = 100;
        Ok(StageOutcome::Applied)
    }

    /// Mark each side against a snapshot of the other taken before marking
    fn cross_compare(&self, state: &mut ReconcileState, epoch: (u64, u64)) {
        let (Some(library), Some(chart)) =
            (state.library.collection.as_mut(), state.chart.collection.as_mut())
        else {
            return;
        };

        if !library.has_status(Status::Confirmed) || !chart.has_status(Status::Confirmed) {
            warn!("Cross-compare skipped: both sides need at least one confirmed entry");
            return;
        }

        let library_before: Vec<Entry> = library.entries().to_vec();
        let chart_before: Vec<Entry> = chart.entries().to_vec();

        chart.dispatch(ReconcileEvent::CrossCompare {
            other: &library_before,
            marker: Action::Import,
            comparator: self.comparator,
        });
        library.dispatch(ReconcileEvent::CrossCompare {
            other: &chart_before,
            marker: Action::Clear,
            comparator: self.comparator,
        });

        info!(
            to_import = chart.marked(Action::Import).count(),
            to_clear = library.marked(Action::Clear).count(),
            "Cross-compare complete"
        );
        state.compared = Some(epoch);
    }

    /// Add every chart entry marked for import to the library
    #[instrument(skip(self, ctx), fields(run_id = %self.run_id))]
    pub async fn import(&self, ctx: &RunContext) -> Result<StageOutcome, ReconcileError> {
        self.mutate(ctx, MutateAction::Add).await
    }

    /// Remove every library entry marked for clearing
    #[instrument(skip(self, ctx), fields(run_id = %self.run_id))]
    pub async fn clear(&self, ctx: &RunContext) -> Result<StageOutcome, ReconcileError> {
        self.mutate(ctx, MutateAction::Remove).await
    }

    async fn mutate(
        &self,
        ctx: &RunContext,
        action: MutateAction,
    ) -> Result<StageOutcome, ReconcileError> {
        // Imports come from chart marks, clears from library marks
        let (stage, side) = match action {
            MutateAction::Add => (Stage::Import, Side::Chart),
            MutateAction::Remove => (Stage::Clear, Side::Library),
        };

        let (epoch, kind, ids) = {
            let mut state = self.lock();
            if state.stage(stage).is_loading() {
                return Err(ReconcileError::AlreadyRunning(stage));
            }
            let readiness = state.readiness();
            let (ready, ids) = match action {
                MutateAction::Add => (readiness.import, state.import_ids()),
                MutateAction::Remove => (readiness.clear, state.clear_ids()),
            };
            if !ready {
                return Err(not_ready(stage, "nothing is marked for this action"));
            }

            self.begin(&mut state, stage)?;
            (state.epoch(), state.params.kind, ids)
        };

        let result =
            mutate_in_batches(self.library.as_ref(), &ctx.library, kind, action, &ids).await;
        if let Err(e) = result {
            error!(%stage, error = %e, "Library update failed");
            let mut state = self.lock();
            *state.stage_mut(stage) =
                StageState::Failed(StageError::from_service(self.library.name(), e));
            return Ok(StageOutcome::Failed);
        }

        let mut state = self.lock();
        *state.stage_mut(stage) = StageState::Succeeded;
        if state.epoch() != epoch {
            warn!(%stage, "Library updated, but the run changed meanwhile; marks left as-is");
            return Ok(StageOutcome::Discarded);
        }

        if let Some(c) = state.side_mut(side).collection.as_mut() {
            c.dispatch(ReconcileEvent::Resolve);
        }
        info!(%stage, count = ids.len(), "Marked entries resolved");
        Ok(StageOutcome::Applied)
    }
}

fn other(side: Side) -> Side {
    match side {
        Side::Library => Side::Chart,
        Side::Chart => Side::Library,
    }
}

fn not_ready(stage: Stage, reason: &str) -> ReconcileError {
    ReconcileError::NotReady {
        stage,
        reason: reason.to_string(),
    }
}
