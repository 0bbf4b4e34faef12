//! Scrobbling-service adapter (Last.fm API).
//!
//! Provides the user's chart: top artists, albums or tracks over a period.
//!
//! ## API quirks
//!
//! - Numbers arrive as strings (`"playcount": "123"`)
//! - Empty `mbid` means no identifier
//! - Errors may come back as HTTP 200 with an `{"error": N}` body
//! - Images are tagged by size name rather than dimensions

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::core::limits::{require, ServiceLimits, ValidationError};
use crate::domain::{ContentKind, ContentRecord, Profile};

use super::{
    percent, ContentService, Credential, FetchOptions, ParseError, Progress, ServiceError,
};

/// Default API root
pub const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";

// ============================================================================
// Parsing adapter
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawImage {
    #[serde(rename = "#text", default)]
    url: String,
    #[serde(default)]
    size: String,
}

/// Size names from smallest to largest
const IMAGE_SIZES: [&str; 5] = ["small", "medium", "large", "extralarge", "mega"];

fn size_rank(size: &str) -> usize {
    IMAGE_SIZES
        .iter()
        .position(|s| *s == size)
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Largest named size with a non-empty URL
fn best_image(images: &[RawImage]) -> Option<String> {
    let mut best: Option<(usize, &str)> = None;
    for image in images.iter().filter(|i| !i.url.is_empty()) {
        let rank = size_rank(&image.size);
        if best.map_or(true, |(r, _)| rank > r) {
            best = Some((rank, &image.url));
        }
    }
    best.map(|(_, url)| url.to_string())
}

/// Numeric field that may be encoded as a string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Number {
    Int(u64),
    Text(String),
}

fn number(value: Option<Number>, field: &str) -> Result<Option<u64>, ParseError> {
    match value {
        None => Ok(None),
        Some(Number::Int(n)) => Ok(Some(n)),
        Some(Number::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Number::Text(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ParseError::Malformed(format!("{} is not a number: '{}'", field, s))),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RankAttr {
    rank: Option<Number>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: Option<String>,
    #[serde(rename = "#text")]
    text: Option<String>,
}

/// Artist credit: an object in charts, a bare string in search results
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArtistCredit {
    Name(String),
    Ref(ArtistRef),
}

impl ArtistCredit {
    fn into_name(self) -> Option<String> {
        match self {
            Self::Name(n) => Some(n),
            Self::Ref(r) => r.name.or(r.text),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawItem {
    name: Option<String>,
    mbid: Option<String>,
    url: Option<String>,
    playcount: Option<Number>,
    duration: Option<Number>,
    artist: Option<ArtistCredit>,
    #[serde(default)]
    image: Vec<RawImage>,
    #[serde(rename = "@attr", default)]
    attr: RankAttr,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    name: Option<String>,
    realname: Option<String>,
    url: Option<String>,
    #[serde(default)]
    image: Vec<RawImage>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    user: RawUser,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: u32,
    #[serde(default)]
    message: String,
}

fn item_record(kind: ContentKind, raw: RawItem) -> Result<ContentRecord, ParseError> {
    let context = kind.as_str();
    let name = raw.name.ok_or_else(|| ParseError::missing("name", context))?;

    let artist_names = match kind {
        ContentKind::Artist => Vec::new(),
        ContentKind::Album | ContentKind::Track => {
            let artist = raw
                .artist
                .and_then(ArtistCredit::into_name)
                .ok_or_else(|| ParseError::missing("artist", context))?;
            vec![artist]
        }
    };

    let duration_ms = match kind {
        ContentKind::Track => number(raw.duration, "duration")?.map(|secs| secs * 1000),
        _ => None,
    };

    Ok(ContentRecord {
        kind,
        external_id: raw.mbid.filter(|m| !m.is_empty()),
        name,
        artist_names,
        play_count: number(raw.playcount, "playcount")?,
        rank: number(raw.attr.rank, "rank")?
            .map(u32::try_from)
            .transpose()
            .map_err(|_| ParseError::Malformed("rank is out of range".to_string()))?,
        duration_ms,
        source_url: raw.url.filter(|u| !u.is_empty()),
        image_url: best_image(&raw.image),
    })
}

fn items_at(raw: &Value, outer: &str, inner: &str) -> Result<Vec<RawItem>, ParseError> {
    let list = raw
        .get(outer)
        .ok_or_else(|| ParseError::missing(outer, "response"))?
        .get(inner)
        .cloned()
        .unwrap_or(Value::Array(Vec::new()));

    // A single result is sometimes returned as an object instead of a list
    let list = match list {
        Value::Object(_) => Value::Array(vec![list]),
        other => other,
    };
    Ok(serde_json::from_value(list)?)
}

/// Parse `user.getinfo`
pub fn parse_profile(raw: &Value) -> Result<Profile, ParseError> {
    let info: UserInfo = serde_json::from_value(raw.clone())?;
    Ok(Profile {
        id: info
            .user
            .name
            .ok_or_else(|| ParseError::missing("name", "profile"))?,
        display_name: info.user.realname.filter(|n| !n.is_empty()),
        image_url: best_image(&info.user.image),
        profile_url: info.user.url,
    })
}

/// Parse `user.gettopartists`
pub fn parse_artists(raw: &Value) -> Result<Vec<ContentRecord>, ParseError> {
    items_at(raw, "topartists", "artist")?
        .into_iter()
        .map(|i| item_record(ContentKind::Artist, i))
        .collect()
}

/// Parse `user.gettopalbums`
pub fn parse_albums(raw: &Value) -> Result<Vec<ContentRecord>, ParseError> {
    items_at(raw, "topalbums", "album")?
        .into_iter()
        .map(|i| item_record(ContentKind::Album, i))
        .collect()
}

/// Parse `user.gettoptracks`
pub fn parse_tracks(raw: &Value) -> Result<Vec<ContentRecord>, ParseError> {
    items_at(raw, "toptracks", "track")?
        .into_iter()
        .map(|i| item_record(ContentKind::Track, i))
        .collect()
}

/// Parse a chart response of the given kind
pub fn parse_chart(kind: ContentKind, raw: &Value) -> Result<Vec<ContentRecord>, ParseError> {
    match kind {
        ContentKind::Artist => parse_artists(raw),
        ContentKind::Album => parse_albums(raw),
        ContentKind::Track => parse_tracks(raw),
    }
}

/// Parse `{artist,album,track}.search`
pub fn parse_search(kind: ContentKind, raw: &Value) -> Result<Vec<ContentRecord>, ParseError> {
    let results = raw
        .get("results")
        .ok_or_else(|| ParseError::missing("results", "search"))?;
    let matches = format!("{}matches", kind.as_str());
    items_at(results, &matches, kind.as_str())?
        .into_iter()
        .map(|i| item_record(kind, i))
        .collect()
}

// ============================================================================
// HTTP client
// ============================================================================

/// Last.fm API client
pub struct LastFmClient {
    base_url: String,
    search_limit: u32,
    client: reqwest::Client,
}

impl Default for LastFmClient {
    fn default() -> Self {
        Self::new(LASTFM_API_BASE)
    }
}

impl LastFmClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            search_limit: 5,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_search_limit(mut self, search_limit: u32) -> Self {
        self.search_limit = search_limit;
        self
    }

    fn chart_method(kind: ContentKind) -> &'static str {
        match kind {
            ContentKind::Artist => "user.gettopartists",
            ContentKind::Album => "user.gettopalbums",
            ContentKind::Track => "user.gettoptracks",
        }
    }

    /// Map a Last.fm error code to a service error
    fn api_error(status: u16, error: ApiError) -> ServiceError {
        let message = format!("Last.fm error {}: {}", error.error, error.message);
        match error.error {
            // invalid auth, invalid key, invalid session, unauthorized token
            4 | 9 | 10 | 14 => ServiceError::Unauthorized {
                status: if status == 200 { 401 } else { status },
                message,
            },
            29 => ServiceError::RateLimited {
                message,
                retry_after_seconds: None,
            },
            _ => ServiceError::Upstream {
                status: if status == 200 { 400 } else { status },
                message,
            },
        }
    }

    /// Call an API method and return the JSON body
    async fn call(
        &self,
        credential: &Credential,
        params: &[(&str, &str)],
    ) -> Result<Value, ServiceError> {
        let api_key = require("chart api key", Some(credential.secret.as_str()))?;

        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .query(&[("api_key", api_key), ("format", "json")])
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        let value: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(_) if status >= 400 => return Err(ServiceError::from_status(status, body)),
            Err(e) => return Err(ParseError::from(e).into()),
        };

        if let Ok(error) = serde_json::from_value::<ApiError>(value.clone()) {
            return Err(Self::api_error(status, error));
        }
        if status >= 400 {
            return Err(ServiceError::from_status(status, body));
        }

        Ok(value)
    }
}

#[async_trait]
impl ContentService for LastFmClient {
    fn name(&self) -> &str {
        "lastfm"
    }

    async fn fetch_profile(&self, credential: &Credential) -> Result<Profile, ServiceError> {
        let user = require("username", credential.username.as_deref())?;
        let raw = self
            .call(credential, &[("method", "user.getinfo"), ("user", user)])
            .await?;
        Ok(parse_profile(&raw)?)
    }

    async fn fetch(
        &self,
        credential: &Credential,
        options: &FetchOptions,
    ) -> Result<Vec<ContentRecord>, ServiceError> {
        ServiceLimits::CHART.validate_page_size(options.limit)?;
        let user = require("username", credential.username.as_deref())?;
        let period = options.period.ok_or_else(|| ValidationError::MissingOption {
            name: "period".to_string(),
        })?;

        let limit = options.limit.to_string();
        let raw = self
            .call(
                credential,
                &[
                    ("method", Self::chart_method(options.kind)),
                    ("user", user),
                    ("period", period.as_str()),
                    ("limit", limit.as_str()),
                    ("page", "1"),
                ],
            )
            .await?;

        let records = parse_chart(options.kind, &raw)?;
        info!(kind = %options.kind, %period, count = records.len(), "Fetched chart");
        Ok(records)
    }

    async fn search(
        &self,
        credential: &Credential,
        candidates: &[ContentRecord],
        progress: Progress<'_>,
    ) -> Result<Vec<Vec<ContentRecord>>, ServiceError> {
        ServiceLimits::CHART.validate_page_size(self.search_limit)?;

        let limit = self.search_limit.to_string();
        let mut results = Vec::with_capacity(candidates.len());
        progress(0);

        for (i, candidate) in candidates.iter().enumerate() {
            let kind = candidate.kind;
            let method = format!("{}.search", kind.as_str());
            let mut params = vec![
                ("method", method.as_str()),
                (kind.as_str(), candidate.name.as_str()),
                ("limit", limit.as_str()),
            ];
            if kind == ContentKind::Track {
                if let Some(artist) = candidate.primary_artist() {
                    params.push(("artist", artist));
                }
            }

            let raw = self.call(credential, &params).await?;
            let found = parse_search(kind, &raw)?;
            debug!(name = %candidate.name, found = found.len(), "Chart catalog search");
            results.push(found);
            progress(percent(i + 1, candidates.len()));
        }

        Ok(results)
    }
}
