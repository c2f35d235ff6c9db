use chrono::{Local, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const CONFIG_PATH_ENV: &str = "RANKMON_CONFIG";

/// Six-field cron expression: daily at midnight.
pub const DEFAULT_SCHEDULE: &str = "0 0 0 * * *";
pub const DEFAULT_SCAN_ROW_LIMIT: usize = 500;
/// Columns B..Z of the store layout.
pub const DEFAULT_RANK_COLUMN_CAPACITY: usize = 25;

/// A fully validated configuration. Loaded fresh for every cycle and passed
/// down by value; nothing here is shared across cycles.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_search_rank: u32,
    pub targets: Vec<MonitoredTarget>,
    pub store: StoreInfo,
    pub search: SearchConfig,
    pub schedule: String,
    pub timezone: Option<Tz>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredTarget {
    /// Substring matched (case-sensitively) against result URLs.
    pub url: String,
    pub keywords: Vec<String>,
    pub sheet_index: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreInfo {
    #[serde(alias = "fileId")]
    pub file_id: String,

    #[serde(default, alias = "credentialsPath")]
    pub credentials_path: Option<PathBuf>,

    #[serde(default = "default_api_base", alias = "apiBase")]
    pub api_base: String,

    #[serde(default = "default_token_url", alias = "tokenUrl")]
    pub token_url: String,

    /// Rows past this bound are never searched for a date match.
    #[serde(default = "default_scan_row_limit", alias = "scanRowLimit")]
    pub scan_row_limit: usize,

    #[serde(
        default = "default_rank_column_capacity",
        alias = "rankColumnCapacity"
    )]
    pub rank_column_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Googler,
    CustomSearch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default = "default_command")]
    pub command: String,

    #[serde(default, alias = "extraArgs")]
    pub extra_args: Vec<String>,

    #[serde(default = "default_timeout_secs", alias = "timeoutSecs")]
    pub timeout_secs: u64,

    #[serde(default = "default_courtesy_delay_secs", alias = "courtesyDelaySecs")]
    pub courtesy_delay_secs: u64,

    #[serde(default, alias = "apiKey")]
    pub api_key: Option<String>,

    #[serde(default, alias = "engineId")]
    pub engine_id: Option<String>,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_api_base() -> String {
    "https://sheets.googleapis.com".to_string()
}
fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_scan_row_limit() -> usize {
    DEFAULT_SCAN_ROW_LIMIT
}
fn default_rank_column_capacity() -> usize {
    DEFAULT_RANK_COLUMN_CAPACITY
}
fn default_command() -> String {
    "googler".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_courtesy_delay_secs() -> u64 {
    5
}
fn default_endpoint() -> String {
    "https://www.googleapis.com/customsearch/v1".to_string()
}
fn default_schedule() -> String {
    DEFAULT_SCHEDULE.to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            command: default_command(),
            extra_args: Vec::new(),
            timeout_secs: default_timeout_secs(),
            courtesy_delay_secs: default_courtesy_delay_secs(),
            api_key: None,
            engine_id: None,
            endpoint: default_endpoint(),
        }
    }
}

impl StoreInfo {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            credentials_path: None,
            api_base: default_api_base(),
            token_url: default_token_url(),
            scan_row_limit: DEFAULT_SCAN_ROW_LIMIT,
            rank_column_capacity: DEFAULT_RANK_COLUMN_CAPACITY,
        }
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("rankmon")
                .join("credentials.json")
        })
    }
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(alias = "maxSearchRank")]
    max_search_rank: i64,

    #[serde(alias = "rankMonitoredSearches")]
    rank_monitored_searches: Vec<RawTarget>,

    #[serde(alias = "storeInfo", alias = "google_sheets_info")]
    store_info: StoreInfo,

    #[serde(default)]
    search: SearchConfig,

    #[serde(default = "default_schedule")]
    schedule: String,

    #[serde(default)]
    timezone: Option<String>,
}

#[derive(Deserialize)]
struct RawTarget {
    url: String,

    #[serde(alias = "searchWords")]
    search_words: Vec<String>,

    #[serde(default, alias = "sheetIndex")]
    sheet_index: Option<usize>,
}

/// Which parser to run over the config text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// Resolves the config path from the CLI flag, then `RANKMON_CONFIG`, then
/// `./config.json`.
pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
    if let Some(p) = cli_path {
        return PathBuf::from(p);
    }
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

impl Config {
    /// Reads and validates the configuration at `path`. Any missing or
    /// invalid field rejects the whole file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&content, ConfigFormat::from_path(path)).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })?;
        info!(
            "Loaded config {:?}: {} monitored target(s), max rank {}",
            path,
            config.targets.len(),
            config.max_search_rank
        );
        Ok(config)
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let value: Value = match format {
            ConfigFormat::Json => json5::from_str(content).map_err(|e| ConfigError::Parse {
                path: "<inline>".to_string(),
                message: e.to_string(),
            })?,
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse {
                path: "<inline>".to_string(),
                message: e.to_string(),
            })?,
        };

        let missing = missing_fields(&value);
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let raw: RawConfig =
            serde_json::from_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let max_search_rank = u32::try_from(raw.max_search_rank)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "max_search_rank must be a positive integer, got {}",
                    raw.max_search_rank
                ))
            })?;

        if raw.rank_monitored_searches.is_empty() {
            return Err(ConfigError::Invalid(
                "rank_monitored_searches must not be empty".to_string(),
            ));
        }

        if raw.store_info.scan_row_limit == 0 {
            return Err(ConfigError::Invalid(
                "store_info.scan_row_limit must be greater than zero".to_string(),
            ));
        }

        if raw.search.provider == ProviderKind::CustomSearch {
            let mut missing = Vec::new();
            if raw.search.api_key.as_deref().is_none_or(str::is_empty) {
                missing.push("search.api_key".to_string());
            }
            if raw.search.engine_id.as_deref().is_none_or(str::is_empty) {
                missing.push("search.engine_id".to_string());
            }
            if !missing.is_empty() {
                return Err(ConfigError::Missing(missing));
            }
        }

        let timezone = match raw.timezone.as_deref() {
            Some(name) => Some(name.parse::<Tz>().map_err(|_| {
                ConfigError::Invalid(format!("unknown timezone '{}'", name))
            })?),
            None => None,
        };

        let targets = raw
            .rank_monitored_searches
            .into_iter()
            .enumerate()
            .map(|(i, t)| MonitoredTarget {
                url: t.url,
                keywords: t.search_words,
                sheet_index: t.sheet_index.unwrap_or(i),
            })
            .collect();

        Ok(Self {
            max_search_rank,
            targets,
            store: raw.store_info,
            search: raw.search,
            schedule: raw.schedule,
            timezone,
        })
    }

    /// Wall-clock "now" in the configured timezone, or host local time.
    pub fn now(&self) -> NaiveDateTime {
        match self.timezone {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => Local::now().naive_local(),
        }
    }
}

fn field<'a>(obj: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| obj.get(*name))
        .filter(|v| !v.is_null())
}

/// Collects every required field that is absent, including sub-fields of
/// each monitored search entry.
fn missing_fields(value: &Value) -> Vec<String> {
    let mut missing = Vec::new();

    match field(value, &["store_info", "storeInfo", "google_sheets_info"]) {
        None => missing.push("store_info".to_string()),
        Some(info) => {
            if field(info, &["file_id", "fileId"]).is_none() {
                missing.push("store_info.file_id".to_string());
            }
        }
    }

    if field(value, &["max_search_rank", "maxSearchRank"]).is_none() {
        missing.push("max_search_rank".to_string());
    }

    match field(value, &["rank_monitored_searches", "rankMonitoredSearches"]) {
        None => missing.push("rank_monitored_searches".to_string()),
        Some(Value::Array(entries)) => {
            for (i, entry) in entries.iter().enumerate() {
                if field(entry, &["url"]).is_none() {
                    missing.push(format!("rank_monitored_searches[{}].url", i));
                }
                if field(entry, &["search_words", "searchWords"]).is_none() {
                    missing.push(format!("rank_monitored_searches[{}].search_words", i));
                }
            }
        }
        // Wrong type is reported by the typed pass.
        Some(_) => {}
    }

    if !missing.is_empty() {
        debug!("Config is missing fields: {:?}", missing);
    }
    missing
}
