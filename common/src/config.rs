use chrono::{NaiveDate, Utc};
use config::{Config, ConfigError, Map};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_api_config")]
    pub api: ApiConfig,
    #[serde(default = "default_retry_config")]
    pub retry: RetryConfig,
    #[serde(default = "default_storage_config")]
    pub storage: StorageSettings,
    #[serde(default = "default_silver_config")]
    pub silver: SilverConfig,
    #[serde(default)]
    pub logging: LogConfig,
    pub date: Option<DateConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound of the random extra delay, as a fraction of the backoff.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default = "default_true")]
    pub honor_retry_after: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    #[serde(default = "default_storage_root")]
    pub root: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SilverConfig {
    #[serde(default = "default_max_reject_ratio")]
    pub max_reject_ratio: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DateConfig {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

fn default_api_config() -> ApiConfig {
    ApiConfig {
        base_url: default_base_url(),
        per_page: default_per_page(),
        max_pages: default_max_pages(),
        timeout_secs: default_timeout_secs(),
    }
}

fn default_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: default_max_attempts(),
        base_delay_ms: default_base_delay_ms(),
        max_delay_ms: default_max_delay_ms(),
        jitter: default_jitter(),
        honor_retry_after: true,
    }
}

fn default_storage_config() -> StorageSettings {
    StorageSettings {
        root: default_storage_root(),
    }
}

fn default_silver_config() -> SilverConfig {
    SilverConfig {
        max_reject_ratio: default_max_reject_ratio(),
    }
}

fn default_base_url() -> String {
    "https://api.openbrewerydb.org/v1/breweries".to_string()
}

fn default_per_page() -> u32 {
    200
}

fn default_max_pages() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_storage_root() -> String {
    "data".to_string()
}

fn default_max_reject_ratio() -> f64 {
    1.0
}

impl Settings {
    /// Loads `path` (which must exist) layered with `APP_`-prefixed
    /// environment variables, e.g. `APP_API__PER_PAGE=50`.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        Self::load(path, None)
    }

    fn load(path: &str, env: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .source(env),
            );

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        debug!(
            base_url = %settings.api.base_url,
            per_page = settings.api.per_page,
            storage_root = %settings.storage.root,
            "Parsed pipeline settings"
        );

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api.per_page == 0 {
            return Err(ConfigError::Message("api.per_page must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message("retry.max_attempts must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.silver.max_reject_ratio) {
            return Err(ConfigError::Message(
                "silver.max_reject_ratio must lie within [0, 1]".into(),
            ));
        }
        if let Some(date) = &self.date {
            date.to_naive_date()?;
        }
        Ok(())
    }

    /// The configured run date, or today in UTC when none is pinned.
    pub fn run_date(&self) -> Result<NaiveDate, ConfigError> {
        match &self.date {
            Some(date) => date.to_naive_date(),
            None => Ok(Utc::now().date_naive()),
        }
    }
}

impl DateConfig {
    pub fn to_naive_date(&self) -> Result<NaiveDate, ConfigError> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or_else(|| {
            ConfigError::Message(format!(
                "invalid date {}-{:02}-{:02}",
                self.year, self.month, self.day
            ))
        })
    }
}
