use crate::engine::SyncSettings;
use crate::guard::DEFAULT_RECENCY_WINDOW_SECS;
use crate::storage::resolve_data_path;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TABLE: &str = "reports";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got `{value}`")]
    InvalidNumber { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// In-process table persisted to a JSON file.
    Local { data_path: PathBuf },
    /// Hosted table reached over its REST endpoint.
    Rest {
        base_url: String,
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub backend: Backend,
    pub sync: SyncSettings,
    pub recency_window_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = lookup("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let table = lookup("REMOTE_TABLE")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TABLE.to_string());

        let backend = match lookup("REMOTE_URL").filter(|value| !value.trim().is_empty()) {
            Some(base_url) => Backend::Rest {
                base_url,
                api_key: lookup("REMOTE_API_KEY").filter(|value| !value.is_empty()),
            },
            None => Backend::Local {
                data_path: resolve_data_path(lookup("APP_DATA_PATH")),
            },
        };

        let defaults = SyncSettings::default();
        let sync = SyncSettings {
            table,
            poll_interval: seconds(&lookup, "POLL_INTERVAL_SECS", defaults.poll_interval)?,
            recovery_check_interval: seconds(
                &lookup,
                "RECOVERY_CHECK_SECS",
                defaults.recovery_check_interval,
            )?,
            retry_backoff: seconds(&lookup, "RETRY_BACKOFF_SECS", defaults.retry_backoff)?,
            ..defaults
        };

        let recency_window_secs = seconds(
            &lookup,
            "RECENCY_WINDOW_SECS",
            Duration::from_secs(DEFAULT_RECENCY_WINDOW_SECS),
        )?
        .as_secs();

        Ok(Self {
            port,
            backend,
            sync,
            recency_window_secs,
        })
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::InvalidNumber { key, value }),
        },
    }
}
