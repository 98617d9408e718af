//! Tracker configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! stock setup: CoinGecko top 250 in USD, 10 gainers and losers, 2-day
//! activity and compaction windows, 10-day retention.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use moverlog_core::data::{FetchPolicy, MarketsQuery, DEFAULT_MARKETS_URL};
use moverlog_core::ledger::{
    RetentionPolicy, DEFAULT_ACTIVITY_WINDOW_HOURS, DEFAULT_COMPACTION_AGE_HOURS,
    DEFAULT_RETENTION_DAYS,
};
use moverlog_core::DEFAULT_TOP_K;

use crate::cycle::CycleSettings;

pub const DEFAULT_LEDGER_PATH: &str = "crypto_history.json";
pub const DEFAULT_REPORT_PATH: &str = "crypto_data.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Upper bound on any tracking window.
pub const MAX_WINDOW_DAYS: i64 = 36_500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    pub vs_currency: String,
    pub per_page: u32,
    pub page: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MARKETS_URL.to_string(),
            vs_currency: "usd".to_string(),
            per_page: 250,
            page: 1,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub ledger_path: PathBuf,
    pub report_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub top_k: usize,
    pub activity_window_hours: i64,
    pub compaction_age_hours: i64,
    pub retention_days: i64,
    pub prune_empty_records: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            activity_window_hours: DEFAULT_ACTIVITY_WINDOW_HOURS,
            compaction_age_hours: DEFAULT_COMPACTION_AGE_HOURS,
            retention_days: DEFAULT_RETENTION_DAYS,
            prune_empty_records: false,
        }
    }
}

impl TrackerConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tracking;
        if t.top_k == 0 {
            return Err(ConfigError::Invalid("tracking.top_k must be at least 1".into()));
        }
        if t.activity_window_hours <= 0 || t.compaction_age_hours <= 0 || t.retention_days <= 0 {
            return Err(ConfigError::Invalid(
                "tracking windows must be positive".into(),
            ));
        }
        let max_hours = MAX_WINDOW_DAYS * 24;
        if t.retention_days > MAX_WINDOW_DAYS
            || t.activity_window_hours > max_hours
            || t.compaction_age_hours > max_hours
        {
            return Err(ConfigError::Invalid(format!(
                "tracking windows must not exceed {MAX_WINDOW_DAYS} days"
            )));
        }
        let retention_hours = t.retention_days.checked_mul(24).unwrap_or(i64::MAX);
        if t.compaction_age_hours > retention_hours {
            return Err(ConfigError::Invalid(format!(
                "compaction_age_hours ({}) exceeds the retention horizon ({} days)",
                t.compaction_age_hours, t.retention_days
            )));
        }
        if self.source.url.trim().is_empty() {
            return Err(ConfigError::Invalid("source.url is empty".into()));
        }
        if self.source.per_page == 0 {
            return Err(ConfigError::Invalid("source.per_page must be at least 1".into()));
        }
        if self.source.timeout_secs == 0 {
            return Err(ConfigError::Invalid("source.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            activity_window: Duration::hours(self.tracking.activity_window_hours),
            compaction_age: Duration::hours(self.tracking.compaction_age_hours),
            retention: Duration::days(self.tracking.retention_days),
            prune_empty_records: self.tracking.prune_empty_records,
        }
    }

    pub fn cycle_settings(&self) -> CycleSettings {
        CycleSettings {
            top_k: self.tracking.top_k,
            policy: self.retention_policy(),
        }
    }

    pub fn markets_query(&self) -> MarketsQuery {
        MarketsQuery {
            url: self.source.url.clone(),
            vs_currency: self.source.vs_currency.clone(),
            per_page: self.source.per_page,
            page: self.source.page,
        }
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            timeout: std::time::Duration::from_secs(self.source.timeout_secs),
            max_retries: self.source.max_retries,
            ..FetchPolicy::default()
        }
    }
}
