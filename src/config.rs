use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::IrdsError;

pub const HOME_ENV: &str = "IR_DATASETS_HOME";
pub const DOWNLOADS_ENV: &str = "IR_DATASETS_DOWNLOADS";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub cache_root: Option<String>,
    #[serde(default)]
    pub downloads: Option<String>,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub cache: CacheSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FetchSection {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CacheSection {
    #[serde(default)]
    pub lock_timeout_secs: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub wait_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_failures: Option<u32>,
}

/// Retry and transfer limits for remote downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Bound on connecting and on each individual read, not on the transfer.
    pub timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(600),
        }
    }
}

impl FetchSettings {
    /// Delay before retry number `attempt` (1-based): base, 2*base, 4*base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }
}

/// Limits for the cross-process materialization protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// A lock file whose heartbeat has been silent this long is stale.
    pub lock_timeout: Duration,
    pub poll_interval: Duration,
    pub max_failures: u32,
    /// Upper bound on waiting for a live holder; `None` waits until it finishes.
    pub wait_timeout: Option<Duration>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(1800),
            poll_interval: Duration::from_millis(250),
            max_failures: 3,
            wait_timeout: None,
        }
    }
}

/// Where the download descriptor table lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadsLocation {
    File(Utf8PathBuf),
    Url(String),
}

impl DownloadsLocation {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            DownloadsLocation::Url(trimmed.to_string())
        } else {
            DownloadsLocation::File(Utf8PathBuf::from(trimmed))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub cache_root: Utf8PathBuf,
    pub downloads: DownloadsLocation,
    pub fetch: FetchSettings,
    pub cache: CacheSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `irds.json` in the working directory when present.
    /// Without either, every setting takes its default.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IrdsError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("irds.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IrdsError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IrdsError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IrdsError> {
        Self::resolve_with_env(config, |name| std::env::var(name).ok())
    }

    pub fn resolve_with_env<F>(config: Config, env: F) -> Result<ResolvedConfig, IrdsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let schema_version = config.schema_version.unwrap_or(1);

        let cache_root = match config
            .cache_root
            .or_else(|| env(HOME_ENV).filter(|value| !value.trim().is_empty()))
        {
            Some(root) => Utf8PathBuf::from(root),
            None => default_cache_root()?,
        };

        let downloads = match config
            .downloads
            .or_else(|| env(DOWNLOADS_ENV).filter(|value| !value.trim().is_empty()))
        {
            Some(value) => DownloadsLocation::parse(&value),
            None => DownloadsLocation::File(cache_root.join("downloads.json")),
        };

        let fetch_defaults = FetchSettings::default();
        let fetch = FetchSettings {
            max_attempts: config
                .fetch
                .max_attempts
                .unwrap_or(fetch_defaults.max_attempts)
                .max(1),
            base_delay: config
                .fetch
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(fetch_defaults.base_delay),
            timeout: config
                .fetch
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(fetch_defaults.timeout),
        };

        let cache_defaults = CacheSettings::default();
        let cache = CacheSettings {
            lock_timeout: config
                .cache
                .lock_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(cache_defaults.lock_timeout),
            poll_interval: config
                .cache
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(cache_defaults.poll_interval),
            max_failures: config
                .cache
                .max_failures
                .unwrap_or(cache_defaults.max_failures)
                .max(1),
            wait_timeout: config
                .cache
                .wait_timeout_secs
                .map(Duration::from_secs)
                .or(cache_defaults.wait_timeout),
        };

        Ok(ResolvedConfig {
            schema_version,
            cache_root,
            downloads,
            fetch,
            cache,
        })
    }
}

fn default_cache_root() -> Result<Utf8PathBuf, IrdsError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().join(".ir_datasets")).ok())
        .ok_or_else(|| IrdsError::Filesystem("unable to resolve cache directory".to_string()))
}
