//! Key-value store for credentials and preferences.
//!
//! A single JSON object on disk. Every access takes an `fs2` file lock so two
//! processes never interleave a read-modify-write.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::adapters::Credential;
use crate::core::limits::ValidationError;
use crate::core::RunContext;

/// Streaming-service bearer token
pub const LIBRARY_TOKEN: &str = "library_token";

/// Chart-service API key
pub const CHART_API_KEY: &str = "chart_api_key";

/// Chart-service account name
pub const CHART_USERNAME: &str = "chart_username";

/// JSON-file backed string map
#[derive(Debug, Clone)]
pub struct KeyValueStore {
    path: PathBuf,
}

impl KeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The store at `$CHARTSYNC_HOME/credentials.json`
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(crate::config::credentials_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.read_all()?.into_keys().collect())
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    /// Returns whether the key was present
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut removed = false;
        self.update(|map| removed = map.remove(key).is_some())?;
        Ok(removed)
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open store: {}", self.path.display()))?;
        file.lock_shared()
            .with_context(|| format!("Failed to lock store: {}", self.path.display()))?;
        parse(&mut file, &self.path)
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open store: {}", self.path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to lock store: {}", self.path.display()))?;

        let mut map = parse(&mut file, &self.path)?;
        apply(&mut map);

        let json = serde_json::to_string_pretty(&map).context("Failed to serialize store")?;
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(json.as_bytes())
            .context("Failed to write store")?;
        file.flush().context("Failed to flush store")?;

        // Lock is released when file is dropped
        Ok(())
    }
}

fn parse(file: &mut File, path: &Path) -> Result<BTreeMap<String, String>> {
    let mut content = String::new();
    file.read_to_string(&mut content)
        .with_context(|| format!("Failed to read store: {}", path.display()))?;

    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse store: {}", path.display()))
}

/// Both services' credentials, as read from the store
pub struct Credentials;

impl Credentials {
    /// Assemble a run context.
    ///
    /// The token and API key are required. The chart username is optional
    /// here; its absence surfaces when the chart is fetched.
    pub fn load(store: &KeyValueStore) -> Result<RunContext> {
        let token = store
            .get(LIBRARY_TOKEN)?
            .ok_or_else(|| missing(LIBRARY_TOKEN))?;
        let api_key = store
            .get(CHART_API_KEY)?
            .ok_or_else(|| missing(CHART_API_KEY))?;

        let mut chart = Credential::new(api_key);
        chart.username = store.get(CHART_USERNAME)?;

        Ok(RunContext {
            library: Credential::new(token),
            chart,
        })
    }
}

fn missing(name: &str) -> ValidationError {
    ValidationError::MissingOption {
        name: name.to_string(),
    }
}
