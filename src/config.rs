use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::client::DEFAULT_BASE_URL;
use crate::domain::{DateWindow, Locale};
use crate::error::ExplorerError;
use crate::labels::{FallbackPolicy, Labeler};

pub const CONFIG_FILE: &str = "fgx.json";
pub const API_KEY_ENV: &str = "FGAPIKEY";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub locale: Option<Locale>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub throttle_ms: Option<u64>,
    #[serde(default)]
    pub cache_entries: Option<usize>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub label_policy: Option<FallbackPolicy>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub locale: Locale,
    pub timeout: Duration,
    pub retry_delay: Duration,
    pub throttle_interval: Duration,
    pub cache_entries: usize,
    pub labels: HashMap<String, String>,
    pub label_policy: FallbackPolicy,
}

impl ResolvedConfig {
    pub fn labeler(&self) -> Labeler {
        Labeler::with_overrides(self.labels.clone(), self.label_policy)
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; otherwise `fgx.json` in the working
    /// directory, then the user config directory, then built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ExplorerError> {
        let config_path = match path {
            Some(path) => Some(Utf8PathBuf::from(path)),
            None => Self::discover(),
        };

        let Some(config_path) = config_path else {
            return Ok(Self::resolve_config(Config::default()));
        };

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| ExplorerError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ExplorerError::ConfigParse(err.to_string()))?;
        tracing::debug!(path = %config_path, "config.loaded");

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        ResolvedConfig {
            api_key: config
                .api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            locale: config.locale.unwrap_or_default(),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(60)),
            retry_delay: Duration::from_millis(config.retry_delay_ms.unwrap_or(2000)),
            throttle_interval: config
                .throttle_ms
                .map(Duration::from_millis)
                .unwrap_or(crate::throttle::DEFAULT_INTERVAL),
            cache_entries: config
                .cache_entries
                .unwrap_or(crate::cache::DEFAULT_CAPACITY),
            labels: config.labels,
            label_policy: config.label_policy.unwrap_or_default(),
        }
    }

    fn discover() -> Option<Utf8PathBuf> {
        let local = Utf8PathBuf::from(CONFIG_FILE);
        if local.as_std_path().exists() {
            return Some(local);
        }
        ProjectDirs::from("fi", "fgx", "fgx")
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.config_dir().join(CONFIG_FILE)).ok())
            .filter(|path| path.as_std_path().exists())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    User,
    Environment,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    value: String,
    source: KeySource,
}

impl ApiKey {
    pub fn new(value: impl Into<String>, source: KeySource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> KeySource {
        self.source
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("value", &"***")
            .field("source", &self.source)
            .finish()
    }
}

/// A user-supplied key wins over the environment default.
pub fn resolve_api_key(user: Option<&str>, environment: Option<String>) -> Option<ApiKey> {
    let user = user.map(str::trim).filter(|key| !key.is_empty());
    if let Some(key) = user {
        return Some(ApiKey::new(key, KeySource::User));
    }
    environment
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .map(|key| ApiKey::new(key, KeySource::Environment))
}

pub fn resolve_api_key_from_env(user: Option<&str>) -> Option<ApiKey> {
    resolve_api_key(user, std::env::var(API_KEY_ENV).ok())
}

/// Date range a key is allowed to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatePolicy {
    pub min_start: NaiveDate,
    pub default_start: NaiveDate,
    pub max_end: NaiveDate,
}

impl DatePolicy {
    pub const DEFAULT_KEY_DAYS: i64 = 7;

    pub fn for_source(source: KeySource, today: NaiveDate) -> Self {
        match source {
            KeySource::User => Self {
                min_start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or(today),
                default_start: NaiveDate::from_ymd_opt(2025, 1, 1)
                    .unwrap_or(today)
                    .min(today),
                max_end: today,
            },
            KeySource::Environment => {
                let start = today - chrono::Duration::days(Self::DEFAULT_KEY_DAYS);
                Self {
                    min_start: start,
                    default_start: start,
                    max_end: today,
                }
            }
        }
    }

    pub fn default_window(&self) -> Result<DateWindow, ExplorerError> {
        DateWindow::new(self.default_start, self.max_end)
    }

    pub fn check(&self, window: &DateWindow) -> Result<(), ExplorerError> {
        if window.start() < self.min_start {
            return Err(ExplorerError::InvalidRange(format!(
                "start date {} is before {}; set your own API key to request a longer period",
                window.start(),
                self.min_start
            )));
        }
        if window.end() > self.max_end {
            return Err(ExplorerError::InvalidRange(format!(
                "end date {} is after {}",
                window.end(),
                self.max_end
            )));
        }
        Ok(())
    }
}
