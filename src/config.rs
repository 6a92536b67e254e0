use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::models::DeletionStrategy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub feed: FeedConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    /// Base URL of the wiki API, e.g. `https://wiki.example.com`.
    pub base_url: String,
    /// Environment variable holding the bearer token. Credential storage
    /// itself is out of scope; only the variable name is configured.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_token_env() -> String {
    "WIKISYNC_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Bounded worker pool size for per-page processing.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Emit a progress event every N pages.
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            progress_every: default_progress_every(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_progress_every() -> u64 {
    25
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    700
}

/// One synced wiki source: a space within the remote site.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub space_key: String,
    #[serde(default)]
    pub deletion_strategy: DeletionStrategy,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        SyncError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| SyncError::Config(format!("failed to parse config file: {}", e)))?;

    if config.feed.base_url.trim().is_empty() {
        return Err(SyncError::Config("feed.base_url must not be empty".into()));
    }
    if config.sync.concurrency == 0 {
        return Err(SyncError::Config("sync.concurrency must be >= 1".into()));
    }
    if config.sync.progress_every == 0 {
        return Err(SyncError::Config("sync.progress_every must be >= 1".into()));
    }
    if config.chunking.max_tokens == 0 {
        return Err(SyncError::Config("chunking.max_tokens must be > 0".into()));
    }
    for (id, source) in &config.sources {
        if source.space_key.trim().is_empty() {
            return Err(SyncError::Config(format!(
                "sources.{}.space_key must not be empty",
                id
            )));
        }
    }

    Ok(config)
}

impl Config {
    /// Look up a configured source or fail fast.
    pub fn source(&self, source_id: &str) -> Result<&SourceConfig> {
        self.sources.get(source_id).ok_or_else(|| {
            SyncError::Config(format!("unknown source: '{}'", source_id))
        })
    }
}
