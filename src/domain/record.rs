//! Normalized content records.
//!
//! Both services' payloads are mapped into [`ContentRecord`] by the parsing
//! adapters. The reconciler wraps each record in an [`Entry`] which carries the
//! derived lifecycle state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a reconciliation run is comparing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Artist,
    Album,
    Track,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Track => "track",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "artist" | "artists" => Ok(Self::Artist),
            "album" | "albums" => Ok(Self::Album),
            "track" | "tracks" => Ok(Self::Track),
            other => Err(format!("unknown content kind '{}'", other)),
        }
    }
}

/// A single artist, album or track in the shape shared by both services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub kind: ContentKind,

    /// Service-specific identifier; not comparable across services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    pub name: String,

    /// Ordered artist credits; empty for artists
    #[serde(default)]
    pub artist_names: Vec<String>,

    /// Chart-sourced only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_count: Option<u64>,

    /// Chart position, chart-sourced only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ContentRecord {
    /// Create a record with only the required fields set
    pub fn new(kind: ContentKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            external_id: None,
            name: name.into(),
            artist_names: Vec::new(),
            play_count: None,
            rank: None,
            duration_ms: None,
            source_url: None,
            image_url: None,
        }
    }

    pub fn artist(name: impl Into<String>) -> Self {
        Self::new(ContentKind::Artist, name)
    }

    pub fn album(name: impl Into<String>, artist: impl Into<String>) -> Self {
        Self::new(ContentKind::Album, name).with_artists(vec![artist.into()])
    }

    pub fn track(name: impl Into<String>, artist: impl Into<String>) -> Self {
        Self::new(ContentKind::Track, name).with_artists(vec![artist.into()])
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    pub fn with_artists(mut self, artists: Vec<String>) -> Self {
        self.artist_names = artists;
        self
    }

    pub fn with_play_count(mut self, play_count: u64) -> Self {
        self.play_count = Some(play_count);
        self
    }

    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = Some(rank);
        self
    }

    /// First credited artist, used for disambiguation
    pub fn primary_artist(&self) -> Option<&str> {
        self.artist_names.first().map(String::as_str)
    }

    /// "Artist - Name" for albums and tracks, plain name for artists
    pub fn display_name(&self) -> String {
        match self.primary_artist() {
            Some(artist) if self.kind != ContentKind::Artist => {
                format!("{} - {}", artist, self.name)
            }
            _ => self.name.clone(),
        }
    }
}

/// Account details for either service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,

    pub display_name: Option<String>,

    pub image_url: Option<String>,

    pub profile_url: Option<String>,
}

/// Lifecycle position of an entry, in order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Status {
    /// "No record" sentinel; never held by a live entry
    None = 0,
    #[default]
    Fetched = 1,
    Filtered = 2,
    Sought = 3,
    Found = 4,
    Confirmed = 5,
    Marked = 6,
    Resolved = 7,
}

impl Status {
    pub const ALL: [Status; 8] = [
        Status::None,
        Status::Fetched,
        Status::Filtered,
        Status::Sought,
        Status::Found,
        Status::Confirmed,
        Status::Marked,
        Status::Resolved,
    ];

    pub fn index(self) -> usize {
        self as u8 as usize
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Fetched => "fetched",
            Self::Filtered => "filtered",
            Self::Sought => "sought",
            Self::Found => "found",
            Self::Confirmed => "confirmed",
            Self::Marked => "marked",
            Self::Resolved => "resolved",
        };
        f.write_str(s)
    }
}

/// Pending action on an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Remove from the library
    Clear,
    #[default]
    None,
    /// Add to the library
    Import,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Clear => "clear",
            Self::None => "-",
            Self::Import => "import",
        };
        f.write_str(s)
    }
}

/// A record plus the state derived during one reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub record: ContentRecord,

    pub status: Status,

    pub action: Action,

    /// Candidates from the other service, set once by the search stage
    #[serde(default)]
    pub search_results: Vec<ContentRecord>,

    /// Index into `search_results`; `None` means unconfirmed
    #[serde(default)]
    pub match_index: Option<usize>,

    /// Index into the other service's collection
    #[serde(default)]
    pub cross_index: Option<usize>,
}

impl Entry {
    /// Wrap a freshly fetched record
    pub fn fetched(record: ContentRecord) -> Self {
        Self {
            record,
            status: Status::Fetched,
            action: Action::None,
            search_results: Vec::new(),
            match_index: None,
            cross_index: None,
        }
    }

    /// The search result selected by the confirm stage, if any
    pub fn matched(&self) -> Option<&ContentRecord> {
        self.match_index.and_then(|i| self.search_results.get(i))
    }

    /// The record to compare against the other collection.
    ///
    /// Once a search result has been selected it stands in for the entry,
    /// since it shares the other service's identifiers.
    pub fn comparison_key(&self) -> &ContentRecord {
        self.matched().unwrap_or(&self.record)
    }
}
