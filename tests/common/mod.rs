//! Hand-written collaborators for driving the reconciler in tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use chartsync::adapters::{
    percent, ContentService, Credential, FetchOptions, LibraryService, MutateAction, Progress,
    ServiceError,
};
use chartsync::domain::{ContentKind, ContentRecord, Profile};
use chartsync::RunContext;

pub fn context() -> RunContext {
    RunContext {
        library: Credential::new("token"),
        chart: Credential::new("key").with_username("rj"),
    }
}

/// Streaming-service stand-in
pub struct FakeLibrary {
    pub content: Result<Vec<ContentRecord>, ServiceError>,
    /// Search results by candidate name
    pub catalog: HashMap<String, Vec<ContentRecord>>,
    pub search_error: Option<ServiceError>,
    pub mutate_error: Option<ServiceError>,
    pub mutations: Mutex<Vec<(MutateAction, Vec<String>)>>,
    /// When set, fetch waits for a notification before returning
    pub gate: Option<Arc<Notify>>,
    /// Same, for search
    pub search_gate: Option<Arc<Notify>>,
    /// Same, for mutate
    pub mutate_gate: Option<Arc<Notify>>,
}

impl FakeLibrary {
    pub fn new(content: Vec<ContentRecord>) -> Self {
        Self {
            content: Ok(content),
            catalog: HashMap::new(),
            search_error: None,
            mutate_error: None,
            mutations: Mutex::new(Vec::new()),
            gate: None,
            search_gate: None,
            mutate_gate: None,
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            content: Err(error),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_result(mut self, name: &str, results: Vec<ContentRecord>) -> Self {
        self.catalog.insert(name.to_string(), results);
        self
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_search_gate(mut self, gate: Arc<Notify>) -> Self {
        self.search_gate = Some(gate);
        self
    }

    pub fn with_mutate_gate(mut self, gate: Arc<Notify>) -> Self {
        self.mutate_gate = Some(gate);
        self
    }

    pub fn mutations(&self) -> Vec<(MutateAction, Vec<String>)> {
        self.mutations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentService for FakeLibrary {
    fn name(&self) -> &str {
        "fake-library"
    }

    async fn fetch_profile(&self, _credential: &Credential) -> Result<Profile, ServiceError> {
        Ok(Profile {
            id: "me".into(),
            display_name: None,
            image_url: None,
            profile_url: None,
        })
    }

    async fn fetch(
        &self,
        _credential: &Credential,
        _options: &FetchOptions,
    ) -> Result<Vec<ContentRecord>, ServiceError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.content.clone()
    }

    async fn search(
        &self,
        _credential: &Credential,
        candidates: &[ContentRecord],
        progress: Progress<'_>,
    ) -> Result<Vec<Vec<ContentRecord>>, ServiceError> {
        if let Some(gate) = &self.search_gate {
            gate.notified().await;
        }
        if let Some(e) = &self.search_error {
            return Err(e.clone());
        }
        let mut results = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            results.push(self.catalog.get(&candidate.name).cloned().unwrap_or_default());
            progress(percent(i + 1, candidates.len()));
        }
        Ok(results)
    }
}

#[async_trait]
impl LibraryService for FakeLibrary {
    async fn mutate(
        &self,
        _credential: &Credential,
        _kind: ContentKind,
        action: MutateAction,
        ids: &[String],
    ) -> Result<(), ServiceError> {
        if let Some(gate) = &self.mutate_gate {
            gate.notified().await;
        }
        if let Some(e) = &self.mutate_error {
            return Err(e.clone());
        }
        self.mutations.lock().unwrap().push((action, ids.to_vec()));
        Ok(())
    }
}

/// Chart-service stand-in
pub struct FakeChart {
    pub content: Result<Vec<ContentRecord>, ServiceError>,
    pub catalog: HashMap<String, Vec<ContentRecord>>,
    pub gate: Option<Arc<Notify>>,
}

impl FakeChart {
    pub fn new(content: Vec<ContentRecord>) -> Self {
        Self {
            content: Ok(content),
            catalog: HashMap::new(),
            gate: None,
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            content: Err(error),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_result(mut self, name: &str, results: Vec<ContentRecord>) -> Self {
        self.catalog.insert(name.to_string(), results);
        self
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl ContentService for FakeChart {
    fn name(&self) -> &str {
        "fake-chart"
    }

    async fn fetch_profile(&self, _credential: &Credential) -> Result<Profile, ServiceError> {
        Ok(Profile {
            id: "rj".into(),
            display_name: None,
            image_url: None,
            profile_url: None,
        })
    }

    async fn fetch(
        &self,
        _credential: &Credential,
        _options: &FetchOptions,
    ) -> Result<Vec<ContentRecord>, ServiceError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.content.clone()
    }

    async fn search(
        &self,
        _credential: &Credential,
        candidates: &[ContentRecord],
        progress: Progress<'_>,
    ) -> Result<Vec<Vec<ContentRecord>>, ServiceError> {
        let mut results = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            results.push(self.catalog.get(&candidate.name).cloned().unwrap_or_default());
            progress(percent(i + 1, candidates.len()));
        }
        Ok(results)
    }
}

/// Chart: Radiohead, Beatles and Muse played; Rare Act never played.
pub fn chart_records() -> Vec<ContentRecord> {
    vec![
        ContentRecord::artist("Radiohead").with_play_count(50).with_rank(1),
        ContentRecord::artist("Beatles").with_play_count(30).with_rank(2),
        ContentRecord::artist("Muse").with_play_count(10).with_rank(3),
        ContentRecord::artist("Rare Act").with_play_count(0).with_rank(4),
    ]
}

/// Library: Radiohead, The Beatles and Coldplay followed.
pub fn library_records() -> Vec<ContentRecord> {
    vec![
        ContentRecord::artist("Radiohead").with_id("sp-radiohead"),
        ContentRecord::artist("The Beatles").with_id("sp-beatles"),
        ContentRecord::artist("Coldplay").with_id("sp-coldplay"),
    ]
}

/// Library whose catalog search finds every chart artist
pub fn standard_library() -> FakeLibrary {
    FakeLibrary::new(library_records())
        .with_result(
            "Radiohead",
            vec![ContentRecord::artist("Radiohead").with_id("sp-radiohead")],
        )
        .with_result(
            "Beatles",
            vec![ContentRecord::artist("The Beatles").with_id("sp-beatles")],
        )
        .with_result("Muse", vec![ContentRecord::artist("Muse").with_id("sp-muse")])
}
