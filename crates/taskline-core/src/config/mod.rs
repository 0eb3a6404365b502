//! Runtime sync configuration read from the environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

use crate::models::UserId;
use crate::util::is_http_url;

const DEFAULT_USER_ID: &str = "local";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for crate::Error {
    fn from(error: ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

#[derive(Clone)]
pub struct SyncSettings {
    pub user_id: UserId,
    /// Sync service base URL; `None` keeps the client offline
    pub api_url: Option<String>,
    pub access_token: Option<String>,
    pub http_timeout: Duration,
    /// Timer trigger period; `None` disables the timer
    pub sync_interval: Option<Duration>,
    pub sync_on_mutation: bool,
    /// Offset used to read naive server dates
    pub utc_offset: FixedOffset,
    pub data_dir: Option<PathBuf>,
}

impl fmt::Debug for SyncSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncSettings")
            .field("user_id", &self.user_id)
            .field("api_url", &self.api_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("http_timeout", &self.http_timeout)
            .field("sync_interval", &self.sync_interval)
            .field("sync_on_mutation", &self.sync_on_mutation)
            .field("utc_offset", &self.utc_offset)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl SyncSettings {
    /// Offline settings for the given user
    pub fn local(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            api_url: None,
            access_token: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            sync_interval: Some(Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS)),
            sync_on_mutation: true,
            utc_offset: utc(),
            data_dir: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let user_id = value_or_default(&lookup, "TASKLINE_USER_ID", DEFAULT_USER_ID);

        let api_url = optional_trimmed(&lookup, "TASKLINE_API_URL")
            .map(|value| value.trim_end_matches('/').to_string());
        if let Some(url) = api_url.as_deref() {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid(
                    "TASKLINE_API_URL must start with http:// or https://".to_string(),
                ));
            }
        }

        let access_token = optional_trimmed(&lookup, "TASKLINE_ACCESS_TOKEN");

        let http_timeout_secs = parse_u64(
            &lookup,
            "TASKLINE_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?;
        if http_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "TASKLINE_HTTP_TIMEOUT_SECS must be >= 1".to_string(),
            ));
        }

        let sync_interval_secs = parse_u64(
            &lookup,
            "TASKLINE_SYNC_INTERVAL_SECS",
            DEFAULT_SYNC_INTERVAL_SECS,
        )?;

        let sync_on_mutation = match optional_trimmed(&lookup, "TASKLINE_SYNC_ON_MUTATION") {
            None => true,
            Some(value) => parse_bool(&value).ok_or_else(|| {
                ConfigError::Invalid("TASKLINE_SYNC_ON_MUTATION must be true or false".to_string())
            })?,
        };

        let offset_minutes = value_or_default(&lookup, "TASKLINE_UTC_OFFSET_MINUTES", "0")
            .parse::<i32>()
            .map_err(|_| {
                ConfigError::Invalid("TASKLINE_UTC_OFFSET_MINUTES must be an integer".to_string())
            })?;
        if offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::Invalid(
                "TASKLINE_UTC_OFFSET_MINUTES must be within [-1080, 1080]".to_string(),
            ));
        }
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            ConfigError::Invalid("TASKLINE_UTC_OFFSET_MINUTES is out of range".to_string())
        })?;

        let data_dir = optional_trimmed(&lookup, "TASKLINE_DATA_DIR").map(PathBuf::from);

        Ok(Self {
            user_id: UserId::from(user_id),
            api_url,
            access_token,
            http_timeout: Duration::from_secs(http_timeout_secs),
            sync_interval: (sync_interval_secs > 0)
                .then(|| Duration::from_secs(sync_interval_secs)),
            sync_on_mutation,
            utc_offset,
            data_dir,
        })
    }

    /// Whether a remote endpoint is configured
    pub const fn is_sync_configured(&self) -> bool {
        self.api_url.is_some()
    }
}

fn utc() -> FixedOffset {
    use chrono::Offset;
    chrono::Utc.fix()
}

fn parse_u64(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    optional_trimmed(lookup, name).map_or(Ok(default), |value| {
        value
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid(format!("{name} must be a non-negative integer")))
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
