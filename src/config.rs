//! Configuration for chartsync.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CHARTSYNC_HOME, CHARTSYNC_LIBRARY_URL, CHARTSYNC_CHART_URL)
//! 2. Config file (.chartsync/config.yaml)
//! 3. Defaults (~/.chartsync, public API endpoints)
//!
//! Config file discovery:
//! - Searches current directory and parents for .chartsync/config.yaml
//! - A relative `home` is resolved against the .chartsync/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::lastfm::LASTFM_API_BASE;
use crate::adapters::spotify::SPOTIFY_API_BASE;
use crate::core::limits::{Period, RunParams};
use crate::domain::ContentKind;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Search results requested per candidate unless configured
pub const DEFAULT_SEARCH_LIMIT: u32 = 5;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .chartsync/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicesConfig {
    pub library_url: Option<String>,
    pub chart_url: Option<String>,
    pub search_limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsConfig {
    pub kind: Option<ContentKind>,
    pub period: Option<Period>,
    pub limit: Option<u32>,
    pub min_play_count: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the state directory
    pub home: PathBuf,
    pub library_url: String,
    pub chart_url: String,
    pub search_limit: u32,
    /// Run parameters used when the command line gives none
    pub defaults: RunParams,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".chartsync").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge a parsed config file with environment overrides
fn resolve(
    file: Option<(PathBuf, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    let (config_file, config) = match file {
        Some((path, config)) => (Some(path), Some(config)),
        None => (None, None),
    };

    let home = if let Some(env_home) = env("CHARTSYNC_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(path), Some(home)) = (
        config_file.as_ref(),
        config.as_ref().and_then(|c| c.paths.home.as_ref()),
    ) {
        let dir = path.parent().unwrap_or(Path::new("."));
        resolve_path(dir, home)
    } else {
        default_home
    };

    let services = config.as_ref().map(|c| c.services.clone()).unwrap_or_default();
    let library_url = env("CHARTSYNC_LIBRARY_URL")
        .or(services.library_url)
        .unwrap_or_else(|| SPOTIFY_API_BASE.to_string());
    let chart_url = env("CHARTSYNC_CHART_URL")
        .or(services.chart_url)
        .unwrap_or_else(|| LASTFM_API_BASE.to_string());

    let fallback = RunParams::default();
    let defaults = config.as_ref().map(|c| c.defaults.clone()).unwrap_or_default();
    let defaults = RunParams {
        kind: defaults.kind.unwrap_or(fallback.kind),
        period: defaults.period.unwrap_or(fallback.period),
        limit: defaults.limit.unwrap_or(fallback.limit),
        min_play_count: defaults.min_play_count.unwrap_or(fallback.min_play_count),
    };
    defaults
        .validate()
        .context("Invalid default run parameters in config file")?;

    Ok(ResolvedConfig {
        home,
        library_url,
        chart_url,
        search_limit: services.search_limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
        defaults,
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".chartsync");

    let file = match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    resolve(file, |key| std::env::var(key).ok(), default_home)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the chartsync state directory
pub fn chartsync_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the credential store path ($CHARTSYNC_HOME/credentials.json)
pub fn credentials_path() -> Result<PathBuf> {
    Ok(config()?.home.join("credentials.json"))
}
