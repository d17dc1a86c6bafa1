use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// How a failed synchronization attempt is retried.
///
/// Exactly one shape is configured per synchronizer; `retry_count` and
/// `max_retries` count retries after the first attempt.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryPolicy {
    Fixed {
        retry_count: u32,
        interval_ms: u64,
    },
    Exponential {
        max_retries: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        #[serde(default = "default_factor")]
        factor: f64,
        /// Upper bound of the random extra delay, as a fraction of the
        /// computed delay.
        #[serde(default)]
        jitter: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Fixed {
            retry_count: 3,
            interval_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Retries allowed after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        match self {
            Self::Fixed { retry_count, .. } => *retry_count,
            Self::Exponential { max_retries, .. } => *max_retries,
        }
    }
}

fn default_factor() -> f64 {
    2.0
}

/// One `[[file_sync]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_syncer_config"))]
pub struct RemoteFileSyncerConfig {
    /// Identifier used in logs.
    #[validate(length(min = 1))]
    pub name: String,

    #[validate(url)]
    pub download_url: String,

    /// Path of the Active file.
    #[validate(length(min = 1))]
    pub save_filepath: String,

    /// Scratch path written during a cycle, never exposed to readers.
    #[validate(length(min = 1))]
    pub tmp_filepath: String,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Budget of a single download attempt.
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    /// Refresh period; `0` disables refreshing after startup.
    #[serde(default)]
    pub update_interval_ms: u64,

    /// Expected SHA-256 of the downloaded file, hex encoded.
    #[serde(default)]
    pub checksum_sha256: Option<String>,
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn validate_syncer_config(config: &RemoteFileSyncerConfig) -> Result<(), ValidationError> {
    if config.save_filepath == config.tmp_filepath {
        return Err(ValidationError::new("tmp_filepath_equals_save_filepath"));
    }

    if let Some(checksum) = &config.checksum_sha256 {
        if checksum.len() != 64 || !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::new("invalid_checksum_sha256"));
        }
    }

    if let RetryPolicy::Exponential {
        initial_delay_ms,
        max_delay_ms,
        factor,
        jitter,
        ..
    } = config.retry
    {
        if initial_delay_ms > max_delay_ms || factor < 1.0 || !(0.0..=1.0).contains(&jitter) {
            return Err(ValidationError::new("invalid_exponential_retry"));
        }
    }

    Ok(())
}
