//! Option validation and service-imposed maxima.
//!
//! Everything here runs before any request leaves the process:
//! - Page sizes per service (50 for library endpoints, 1000 for charts)
//! - Mutation batch size (50 ids per call)
//! - Chart periods (closed enumeration)
//! - Required options (credentials, user identity)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ContentKind;

/// Largest page the streaming service returns for list endpoints
pub const LIBRARY_MAX_PAGE: u32 = 50;

/// Largest chart page the scrobbling service returns
pub const CHART_MAX_PAGE: u32 = 1000;

/// Most ids accepted by one library mutation
pub const MUTATE_MAX_BATCH: usize = 50;

/// Validation failures raised before any external call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required option: {name}")]
    MissingOption { name: String },

    #[error("Option '{name}' exceeds the maximum: {actual} > {limit}")]
    ExceedsMaximum { name: String, actual: u64, limit: u64 },

    #[error("Option '{name}' is below the minimum: {actual} < {limit}")]
    BelowMinimum { name: String, actual: u64, limit: u64 },

    #[error("Option '{name}' has unsupported value '{value}' (allowed: {allowed})")]
    NotAllowed {
        name: String,
        value: String,
        allowed: String,
    },
}

/// Per-service request bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLimits {
    /// Largest `limit` one list request may ask for
    pub max_page_size: u32,

    /// Largest number of ids in one mutation, none for read-only services
    pub max_batch: Option<usize>,
}

impl ServiceLimits {
    pub const LIBRARY: Self = Self {
        max_page_size: LIBRARY_MAX_PAGE,
        max_batch: Some(MUTATE_MAX_BATCH),
    };

    pub const CHART: Self = Self {
        max_page_size: CHART_MAX_PAGE,
        max_batch: None,
    };

    /// Check a requested page size against this service's maximum
    pub fn validate_page_size(&self, limit: u32) -> Result<(), ValidationError> {
        if limit < 1 {
            return Err(ValidationError::BelowMinimum {
                name: "limit".to_string(),
                actual: limit as u64,
                limit: 1,
            });
        }
        if limit > self.max_page_size {
            return Err(ValidationError::ExceedsMaximum {
                name: "limit".to_string(),
                actual: limit as u64,
                limit: self.max_page_size as u64,
            });
        }
        Ok(())
    }

    /// Check the ids of one mutation call
    pub fn validate_batch(&self, ids: &[String]) -> Result<(), ValidationError> {
        if ids.is_empty() {
            return Err(ValidationError::BelowMinimum {
                name: "ids".to_string(),
                actual: 0,
                limit: 1,
            });
        }
        let Some(max_batch) = self.max_batch else {
            return Err(ValidationError::NotAllowed {
                name: "ids".to_string(),
                value: ids.len().to_string(),
                allowed: "none, service is read-only".to_string(),
            });
        };
        if ids.len() > max_batch {
            return Err(ValidationError::ExceedsMaximum {
                name: "ids".to_string(),
                actual: ids.len() as u64,
                limit: max_batch as u64,
            });
        }
        Ok(())
    }
}

/// Return the value or a `MissingOption` error naming it
pub fn require<'a>(name: &str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::MissingOption {
            name: name.to_string(),
        }),
    }
}

/// Chart period accepted by the scrobbling service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "overall")]
    Overall,
    #[serde(rename = "7day")]
    Week,
    #[serde(rename = "1month")]
    Month,
    #[default]
    #[serde(rename = "3month")]
    Quarter,
    #[serde(rename = "6month")]
    HalfYear,
    #[serde(rename = "12month")]
    Year,
}

impl Period {
    pub const ALL: [Period; 6] = [
        Period::Overall,
        Period::Week,
        Period::Month,
        Period::Quarter,
        Period::HalfYear,
        Period::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overall => "overall",
            Self::Week => "7day",
            Self::Month => "1month",
            Self::Quarter => "3month",
            Self::HalfYear => "6month",
            Self::Year => "12month",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| ValidationError::NotAllowed {
                name: "period".to_string(),
                value: s.to_string(),
                allowed: Self::ALL
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// User-selected parameters of one reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub kind: ContentKind,

    pub period: Period,

    /// Number of chart entries to fetch
    pub limit: u32,

    /// Chart entries with fewer plays are not candidates
    pub min_play_count: u64,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            kind: ContentKind::Artist,
            period: Period::default(),
            limit: 200,
            min_play_count: 1,
        }
    }
}

impl RunParams {
    pub fn validate(&self) -> Result<(), ValidationError> {
        ServiceLimits::CHART.validate_page_size(self.limit)
    }
}
