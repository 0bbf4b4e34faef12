//! Per-stage loading/error/success state.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::adapters::{ParseError, ServiceError};
use crate::core::limits::ValidationError;

/// The externally visible stages of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FetchLibrary,
    FetchChart,
    Search,
    Import,
    Clear,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FetchLibrary => "fetch-library",
            Self::FetchChart => "fetch-chart",
            Self::Search => "search",
            Self::Import => "import",
            Self::Clear => "clear",
        };
        f.write_str(s)
    }
}

/// A failure recorded against a stage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("No user identity configured for {service}")]
    MissingIdentity { service: String },
}

impl StageError {
    /// Wrap a collaborator failure, singling out a missing username
    pub fn from_service(service: &str, error: ServiceError) -> Self {
        match &error {
            ServiceError::Validation(ValidationError::MissingOption { name }) if name == "username" => {
                Self::MissingIdentity {
                    service: service.to_string(),
                }
            }
            _ => Self::Service(error),
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Service(e) if e.is_auth_expired())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Service(e) if e.is_rate_limited())
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Service(ServiceError::Parse(_)))
    }

    /// Actionable advice for recognized failures
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingIdentity { .. } => {
                Some("Set the chart username with `chartsync login --chart-user <name>`")
            }
            Self::Service(ServiceError::Unauthorized { .. }) => {
                Some("Your session has expired; sign in again with `chartsync login`")
            }
            Self::Service(ServiceError::RateLimited { .. }) => {
                Some("The service is rate limiting requests; try again later")
            }
            _ => None,
        }
    }
}

impl From<ParseError> for StageError {
    fn from(e: ParseError) -> Self {
        Self::Service(ServiceError::Parse(e))
    }
}

/// Loading, error and success are mutually exclusive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StageState {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed(StageError),
}

impl StageState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn error(&self) -> Option<&StageError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Loading => f.write_str("loading"),
            Self::Succeeded => f.write_str("ok"),
            Self::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}
