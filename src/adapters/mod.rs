//! Collaborator interfaces for the two external services.
//!
//! The reconciler only sees these traits. Each implementation owns its HTTP
//! transport and the parsing adapter that maps raw payloads into
//! [`ContentRecord`]s.

pub mod lastfm;
pub mod spotify;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::limits::{Period, ValidationError, MUTATE_MAX_BATCH};
use crate::domain::{ContentKind, ContentRecord, Profile};

pub use lastfm::LastFmClient;
pub use spotify::SpotifyClient;

/// Access credential for one service; opaque to the core
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token or API key
    pub secret: String,

    /// Account name, for services addressed by user
    pub username: Option<String>,
}

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

/// Parameters of one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub kind: ContentKind,

    /// Page size for the library, item count for the chart
    pub limit: u32,

    /// Chart period; ignored by the library
    pub period: Option<Period>,
}

/// Library mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutateAction {
    Add,
    Remove,
}

impl fmt::Display for MutateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

/// Called with a percentage (0-100) as search work completes
pub type Progress<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Percentage of `done` out of `total`, clamped to 0-100
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

/// Malformed or incomplete payloads
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl ParseError {
    pub fn missing(field: &str, context: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
            context: context.to_string(),
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Failures surfaced by service collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authentication expired ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to parse response: {0}")]
    Parse(#[from] ParseError),
}

impl ServiceError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::Unauthorized { status, message },
            429 => Self::RateLimited {
                message,
                retry_after_seconds: None,
            },
            _ => Self::Upstream { status, message },
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// HTTP status, when the failure came from one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status, .. } | Self::Upstream { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::from_status(status.as_u16(), e.to_string()),
            None => Self::Transport(e.to_string()),
        }
    }
}

/// A service that can list a user's content and search its catalog
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Human-readable service name
    fn name(&self) -> &str;

    async fn fetch_profile(&self, credential: &Credential) -> Result<Profile, ServiceError>;

    /// Fetch the user's content (library or chart) as normalized records
    async fn fetch(
        &self,
        credential: &Credential,
        options: &FetchOptions,
    ) -> Result<Vec<ContentRecord>, ServiceError>;

    /// Search this service's catalog for each candidate, in input order
    async fn search(
        &self,
        credential: &Credential,
        candidates: &[ContentRecord],
        progress: Progress<'_>,
    ) -> Result<Vec<Vec<ContentRecord>>, ServiceError>;
}

/// A service holding a mutable library
#[async_trait]
pub trait LibraryService: ContentService {
    /// Add or remove up to one batch of items
    async fn mutate(
        &self,
        credential: &Credential,
        kind: ContentKind,
        action: MutateAction,
        ids: &[String],
    ) -> Result<(), ServiceError>;
}

/// Apply `action` to any number of ids, one batch per call
pub async fn mutate_in_batches(
    service: &dyn LibraryService,
    credential: &Credential,
    kind: ContentKind,
    action: MutateAction,
    ids: &[String],
) -> Result<(), ServiceError> {
    for batch in ids.chunks(MUTATE_MAX_BATCH) {
        service.mutate(credential, kind, action, batch).await?;
    }
    Ok(())
}
