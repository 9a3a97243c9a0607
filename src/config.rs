//! Node configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub proximity: ProximityConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityConfig {
    /// Discovery radius in metres (compared at whole-metre granularity)
    #[serde(default = "default_radius_m")]
    pub radius_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Seconds between scheduled position refreshes
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Candidate sets buffered for a slow consumer
    #[serde(default = "default_feed_buffer")]
    pub buffer: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Directory for the sqlite backend
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

// Defaults
fn default_radius_m() -> f64 { crate::proximity::DEFAULT_RADIUS_M }
fn default_refresh_interval() -> u64 { 30 }
fn default_feed_buffer() -> usize { 16 }
fn default_backend() -> StoreBackend { StoreBackend::Memory }
fn default_data_dir() -> PathBuf { PathBuf::from("./heartwave-data") }

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            radius_m: default_radius_m(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            buffer: default_feed_buffer(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        anyhow::ensure!(
            config.proximity.radius_m.is_finite() && config.proximity.radius_m >= 0.0,
            "proximity.radius_m must be a non-negative number"
        );
        anyhow::ensure!(config.feed.buffer > 0, "feed.buffer must be at least 1");
        Ok(config)
    }
}
