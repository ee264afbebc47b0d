//! Job configuration file.
//!
//! # File layout
//!
//! ```text
//! {
//!   "SAMPLE_SPREADSHEET_ID": "1AbC...",
//!   "NOTION_INTEGRATION_TOKEN": "secret_...",
//!   "SYNC_PAIRS": [
//!     { "RANGE": "Tasks!A:E", "DATABASE_ID": "abc123", "PRIORITY": "grid" },
//!     { "RANGE": "Budget!A:H", "DATABASE_ID": "def456", "PRIORITY": "calculator",
//!       "NAME": "budget", "REPEAT": true, "INTERVAL": "day", "REPEAT_DAY": "18:01" }
//!   ]
//! }
//! ```
//!
//! JSON by default; `.yaml`/`.yml` files are read with serde_yaml.
//!
//! # API pattern
//!
//! - `load_at(path)` — explicit path; used in tests with `TempDir`
//! - `load()` — resolves the default path (`$SHEETSYNC_CONFIG` or
//!   `./config.json`), delegates to `load_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{Cadence, DatabaseId, Priority, RangeRef, SyncJob};

/// Default configuration file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV: &str = "SHEETSYNC_CONFIG";

/// Environment variable consulted when the file carries no grid access token.
pub const GOOGLE_TOKEN_ENV: &str = "GOOGLE_ACCESS_TOKEN";

/// Settle delay used when `SETTLE_DELAY_MS` is absent.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// 1. On-disk shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ConfigFile {
    sample_spreadsheet_id: String,
    notion_integration_token: String,
    #[serde(default)]
    google_access_token: Option<String>,
    #[serde(default)]
    settle_delay_ms: Option<u64>,
    #[serde(default)]
    sync_pairs: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct JobEntry {
    range: String,
    database_id: String,
    priority: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    repeat: bool,
    /// Older configs spell the flag this way; either one enables repetition.
    #[serde(default, rename = "REAPEAT")]
    reapeat: bool,
    #[serde(default)]
    interval: Option<String>,
    #[serde(default)]
    repeat_hour: Option<ScalarValue>,
    #[serde(default)]
    repeat_day: Option<ScalarValue>,
    #[serde(default)]
    repeat_week: Option<ScalarValue>,
    #[serde(default)]
    repeat_month: Option<ScalarValue>,
    #[serde(default)]
    repeat_year: Option<ScalarValue>,
}

/// Cadence values are strings, but `REPEAT_HOUR: 5` is common enough in
/// hand-written files to accept bare numbers too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScalarValue {
    Text(String),
    Int(i64),
}

impl ScalarValue {
    fn into_string(self) -> String {
        match self {
            ScalarValue::Text(s) => s,
            ScalarValue::Int(n) => n.to_string(),
        }
    }
}

impl JobEntry {
    fn into_job(self, index: usize) -> Result<SyncJob, ConfigError> {
        if self.range.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("SYNC_PAIRS[{index}]: RANGE is empty")));
        }
        if self.database_id.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "SYNC_PAIRS[{index}]: DATABASE_ID is empty"
            )));
        }
        let priority: Priority = self
            .priority
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("SYNC_PAIRS[{index}]: {e}")))?;

        let cadence = if self.repeat || self.reapeat {
            let value = match self.interval.as_deref() {
                Some("hour") => self.repeat_hour,
                Some("day") => self.repeat_day,
                Some("week") => self.repeat_week,
                Some("month") => self.repeat_month,
                Some("year") => self.repeat_year,
                _ => None,
            };
            Some(Cadence {
                interval: self.interval,
                value: value.map(ScalarValue::into_string),
            })
        } else {
            None
        };

        Ok(SyncJob {
            range: RangeRef::from(self.range),
            database_id: DatabaseId::from(self.database_id),
            priority,
            name: self.name.filter(|n| !n.trim().is_empty()),
            cadence,
        })
    }
}

// ---------------------------------------------------------------------------
// 2. Validated configuration
// ---------------------------------------------------------------------------

/// Configuration consumed by the engine and the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub spreadsheet_id: String,
    pub record_store_token: String,
    /// Bearer token for the grid store; minting/refreshing it is not our job.
    pub grid_store_token: Option<String>,
    pub settle_delay: Duration,
    /// Jobs in configuration order.
    pub jobs: Vec<SyncJob>,
}

impl Config {
    /// Look a job up by its `NAME`, falling back to its `RANGE`.
    pub fn find_job(&self, name_or_range: &str) -> Option<&SyncJob> {
        self.jobs
            .iter()
            .find(|j| j.name.as_deref() == Some(name_or_range))
            .or_else(|| self.jobs.iter().find(|j| j.range.0 == name_or_range))
    }
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load and validate the configuration at `path`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Json`/`Yaml`
/// (with path) if malformed, `ConfigError::Invalid` if it cannot drive a sync.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file: ConfigFile = if is_yaml(path) {
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml {
            path: path.to_path_buf(),
            source: e,
        })?
    } else {
        serde_json::from_str(&contents).map_err(|e| ConfigError::Json {
            path: path.to_path_buf(),
            source: e,
        })?
    };
    validate(file, std::env::var(GOOGLE_TOKEN_ENV).ok())
}

/// `load_at` convenience wrapper using [`default_path`].
pub fn load() -> Result<Config, ConfigError> {
    load_at(&default_path())
}

/// `$SHEETSYNC_CONFIG` when set, otherwise `./config.json`.
pub fn default_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn validate(file: ConfigFile, env_google_token: Option<String>) -> Result<Config, ConfigError> {
    if file.sample_spreadsheet_id.trim().is_empty() {
        return Err(ConfigError::Invalid("SAMPLE_SPREADSHEET_ID is empty".into()));
    }
    if file.sync_pairs.is_empty() {
        return Err(ConfigError::Invalid("SYNC_PAIRS lists no jobs".into()));
    }

    let jobs = file
        .sync_pairs
        .into_iter()
        .enumerate()
        .map(|(i, entry)| entry.into_job(i))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Config {
        spreadsheet_id: file.sample_spreadsheet_id,
        record_store_token: file.notion_integration_token,
        grid_store_token: file
            .google_access_token
            .filter(|t| !t.trim().is_empty())
            .or(env_google_token),
        settle_delay: file
            .settle_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SETTLE_DELAY),
        jobs,
    })
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
