//! Streaming-service adapter (Spotify Web API).
//!
//! Holds the user's library: followed artists, saved albums and saved tracks.
//! List endpoints are paged at most 50 items at a time and mutations accept at
//! most 50 ids, both checked before a request is built.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::limits::{require, ServiceLimits, ValidationError, LIBRARY_MAX_PAGE};
use crate::domain::{ContentKind, ContentRecord, Profile};

use super::{
    percent, ContentService, Credential, FetchOptions, LibraryService, MutateAction, ParseError,
    Progress, ServiceError,
};

/// Default API root
pub const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

/// Stop following `next` links after this many pages
const MAX_PAGES: usize = 200;

// ============================================================================
// Parsing adapter
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawImage {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    images: Vec<RawImage>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct RawArtist {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    images: Vec<RawImage>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct RawAlbum {
    id: Option<String>,
    name: Option<String>,
    artists: Option<Vec<RawArtist>>,
    #[serde(default)]
    images: Vec<RawImage>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    id: Option<String>,
    name: Option<String>,
    artists: Option<Vec<RawArtist>>,
    duration_ms: Option<u64>,
    album: Option<RawAlbumImages>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct RawAlbumImages {
    #[serde(default)]
    images: Vec<RawImage>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FollowedArtists {
    artists: Page<RawArtist>,
}

#[derive(Debug, Deserialize)]
struct SavedAlbum {
    album: RawAlbum,
}

#[derive(Debug, Deserialize)]
struct SavedTrack {
    track: RawTrack,
}

#[derive(Debug, Deserialize)]
struct SearchArtists {
    artists: Page<RawArtist>,
}

#[derive(Debug, Deserialize)]
struct SearchAlbums {
    albums: Page<RawAlbum>,
}

#[derive(Debug, Deserialize)]
struct SearchTracks {
    tracks: Page<RawTrack>,
}

/// Largest image with a usable URL; missing dimensions rank lowest
fn best_image(images: &[RawImage]) -> Option<String> {
    let mut best: Option<(u64, &str)> = None;
    for image in images {
        let Some(url) = image.url.as_deref().filter(|u| !u.is_empty()) else {
            continue;
        };
        let area = image.width.unwrap_or(0) as u64 * image.height.unwrap_or(0) as u64;
        if best.map_or(true, |(a, _)| area > a) {
            best = Some((area, url));
        }
    }
    best.map(|(_, url)| url.to_string())
}

fn required(value: Option<String>, field: &str, context: &str) -> Result<String, ParseError> {
    value.ok_or_else(|| ParseError::missing(field, context))
}

fn artist_names(artists: Option<Vec<RawArtist>>, context: &str) -> Result<Vec<String>, ParseError> {
    artists
        .ok_or_else(|| ParseError::missing("artists", context))?
        .into_iter()
        .map(|a| required(a.name, "name", "artist credit"))
        .collect()
}

fn artist_record(raw: RawArtist) -> Result<ContentRecord, ParseError> {
    Ok(ContentRecord {
        external_id: raw.id,
        source_url: raw.external_urls.spotify,
        image_url: best_image(&raw.images),
        ..ContentRecord::artist(required(raw.name, "name", "artist")?)
    })
}

fn album_record(raw: RawAlbum) -> Result<ContentRecord, ParseError> {
    let name = required(raw.name, "name", "album")?;
    Ok(ContentRecord {
        external_id: raw.id,
        artist_names: artist_names(raw.artists, "album")?,
        source_url: raw.external_urls.spotify,
        image_url: best_image(&raw.images),
        ..ContentRecord::new(ContentKind::Album, name)
    })
}

fn track_record(raw: RawTrack) -> Result<ContentRecord, ParseError> {
    let name = required(raw.name, "name", "track")?;
    Ok(ContentRecord {
        external_id: raw.id,
        artist_names: artist_names(raw.artists, "track")?,
        duration_ms: raw.duration_ms,
        source_url: raw.external_urls.spotify,
        image_url: raw.album.and_then(|a| best_image(&a.images)),
        ..ContentRecord::new(ContentKind::Track, name)
    })
}

/// Parse the current user's profile
pub fn parse_profile(raw: &Value) -> Result<Profile, ParseError> {
    let user: RawUser = serde_json::from_value(raw.clone())?;
    Ok(Profile {
        id: required(user.id, "id", "profile")?,
        display_name: user.display_name,
        image_url: best_image(&user.images),
        profile_url: user.external_urls.spotify,
    })
}

/// Parse one page of followed artists; returns the records and the next page URL
pub fn parse_artists(raw: &Value) -> Result<(Vec<ContentRecord>, Option<String>), ParseError> {
    let page: FollowedArtists = serde_json::from_value(raw.clone())?;
    let records = page
        .artists
        .items
        .into_iter()
        .map(artist_record)
        .collect::<Result<_, _>>()?;
    Ok((records, page.artists.next))
}

/// Parse one page of saved albums
pub fn parse_albums(raw: &Value) -> Result<(Vec<ContentRecord>, Option<String>), ParseError> {
    let page: Page<SavedAlbum> = serde_json::from_value(raw.clone())?;
    let records = page
        .items
        .into_iter()
        .map(|s| album_record(s.album))
        .collect::<Result<_, _>>()?;
    Ok((records, page.next))
}

/// Parse one page of saved tracks
pub fn parse_tracks(raw: &Value) -> Result<(Vec<ContentRecord>, Option<String>), ParseError> {
    let page: Page<SavedTrack> = serde_json::from_value(raw.clone())?;
    let records = page
        .items
        .into_iter()
        .map(|s| track_record(s.track))
        .collect::<Result<_, _>>()?;
    Ok((records, page.next))
}

/// Parse a library page of the given kind
pub fn parse_library_page(
    kind: ContentKind,
    raw: &Value,
) -> Result<(Vec<ContentRecord>, Option<String>), ParseError> {
    match kind {
        ContentKind::Artist => parse_artists(raw),
        ContentKind::Album => parse_albums(raw),
        ContentKind::Track => parse_tracks(raw),
    }
}

/// Parse a catalog search response
pub fn parse_search(kind: ContentKind, raw: &Value) -> Result<Vec<ContentRecord>, ParseError> {
    match kind {
        ContentKind::Artist => {
            let res: SearchArtists = serde_json::from_value(raw.clone())?;
            res.artists.items.into_iter().map(artist_record).collect()
        }
        ContentKind::Album => {
            let res: SearchAlbums = serde_json::from_value(raw.clone())?;
            res.albums.items.into_iter().map(album_record).collect()
        }
        ContentKind::Track => {
            let res: SearchTracks = serde_json::from_value(raw.clone())?;
            res.tracks.items.into_iter().map(track_record).collect()
        }
    }
}

/// Search query for a record from the other service
pub fn search_query(record: &ContentRecord) -> String {
    let clean = |s: &str| s.replace(['"', ':'], " ").trim().to_string();
    match (record.kind, record.primary_artist()) {
        (ContentKind::Artist, _) | (_, None) => clean(&record.name),
        (ContentKind::Album, Some(artist)) => {
            format!("album:{} artist:{}", clean(&record.name), clean(artist))
        }
        (ContentKind::Track, Some(artist)) => {
            format!("track:{} artist:{}", clean(&record.name), clean(artist))
        }
    }
}

// ============================================================================
// HTTP client
// ============================================================================

/// Spotify Web API client
pub struct SpotifyClient {
    /// API root, without trailing slash
    base_url: String,
    /// Results requested per search
    search_limit: u32,
    /// HTTP client
    client: reqwest::Client,
}

impl Default for SpotifyClient {
    fn default() -> Self {
        Self::new(SPOTIFY_API_BASE)
    }
}

impl SpotifyClient {
    /// Create a client against the given API root
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            search_limit: 5,
            client: reqwest::Client::new(),
        }
    }

    /// Set how many results each catalog search asks for
    pub fn with_search_limit(mut self, search_limit: u32) -> Self {
        self.search_limit = search_limit;
        self
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn library_path(kind: ContentKind) -> &'static str {
        match kind {
            ContentKind::Artist => "me/following",
            ContentKind::Album => "me/albums",
            ContentKind::Track => "me/tracks",
        }
    }

    fn authorized(
        &self,
        method: Method,
        url: &str,
        credential: &Credential,
    ) -> Result<RequestBuilder, ServiceError> {
        let token = require("library token", Some(credential.secret.as_str()))?;
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    /// Send a request and map non-success statuses
    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ServiceError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        match ServiceError::from_status(status.as_u16(), body) {
            ServiceError::RateLimited { message, .. } => Err(ServiceError::RateLimited {
                message,
                retry_after_seconds: retry_after,
            }),
            other => Err(other),
        }
    }

    async fn get_json(&self, request: RequestBuilder) -> Result<Value, ServiceError> {
        let response = self.send(request).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| ServiceError::Parse(ParseError::Malformed(e.to_string())))
    }
}

#[async_trait]
impl ContentService for SpotifyClient {
    fn name(&self) -> &str {
        "spotify"
    }

    async fn fetch_profile(&self, credential: &Credential) -> Result<Profile, ServiceError> {
        let request = self.authorized(Method::GET, &self.api_url("me"), credential)?;
        let raw = self.get_json(request).await?;
        Ok(parse_profile(&raw)?)
    }

    async fn fetch(
        &self,
        credential: &Credential,
        options: &FetchOptions,
    ) -> Result<Vec<ContentRecord>, ServiceError> {
        ServiceLimits::LIBRARY.validate_page_size(options.limit)?;

        let limit = options.limit.to_string();
        let mut request = self
            .authorized(
                Method::GET,
                &self.api_url(Self::library_path(options.kind)),
                credential,
            )?
            .query(&[("limit", limit.as_str())]);
        if options.kind == ContentKind::Artist {
            request = request.query(&[("type", "artist")]);
        }

        let mut records = Vec::new();
        for page in 1..=MAX_PAGES {
            let raw = self.get_json(request).await?;
            let (mut items, next) = parse_library_page(options.kind, &raw)?;
            debug!(page, items = items.len(), "Fetched library page");
            records.append(&mut items);

            match next {
                Some(url) => request = self.authorized(Method::GET, &url, credential)?,
                None => break,
            }
            if page == MAX_PAGES {
                warn!(pages = MAX_PAGES, "Library page cap reached, result truncated");
            }
        }

        info!(kind = %options.kind, count = records.len(), "Fetched library");
        Ok(records)
    }

    async fn search(
        &self,
        credential: &Credential,
        candidates: &[ContentRecord],
        progress: Progress<'_>,
    ) -> Result<Vec<Vec<ContentRecord>>, ServiceError> {
        if self.search_limit > LIBRARY_MAX_PAGE {
            return Err(ValidationError::ExceedsMaximum {
                name: "search_limit".to_string(),
                actual: self.search_limit as u64,
                limit: LIBRARY_MAX_PAGE as u64,
            }
            .into());
        }

        let limit = self.search_limit.to_string();
        let mut results = Vec::with_capacity(candidates.len());
        progress(0);

        for (i, candidate) in candidates.iter().enumerate() {
            let query = search_query(candidate);
            let request = self
                .authorized(Method::GET, &self.api_url("search"), credential)?
                .query(&[
                    ("q", query.as_str()),
                    ("type", candidate.kind.as_str()),
                    ("limit", limit.as_str()),
                ]);

            let raw = self.get_json(request).await?;
            let found = parse_search(candidate.kind, &raw)?;
            debug!(%query, found = found.len(), "Catalog search");
            results.push(found);
            progress(percent(i + 1, candidates.len()));
        }

        Ok(results)
    }
}

#[async_trait]
impl LibraryService for SpotifyClient {
    async fn mutate(
        &self,
        credential: &Credential,
        kind: ContentKind,
        action: MutateAction,
        ids: &[String],
    ) -> Result<(), ServiceError> {
        ServiceLimits::LIBRARY.validate_batch(ids)?;

        let method = match action {
            MutateAction::Add => Method::PUT,
            MutateAction::Remove => Method::DELETE,
        };
        let mut request = self
            .authorized(method, &self.api_url(Self::library_path(kind)), credential)?
            .json(&serde_json::json!({ "ids": ids }));
        if kind == ContentKind::Artist {
            request = request.query(&[("type", "artist")]);
        }

        self.send(request).await?;
        info!(%kind, %action, count = ids.len(), "Library updated");
        Ok(())
    }
}
