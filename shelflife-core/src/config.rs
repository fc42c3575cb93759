//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::{DEFAULT_CACHE_EXPIRY, DEFAULT_RESYNC_INTERVAL};

/// Default ceiling for a streamed dataset payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// Default LMDB map size for the cache store.
pub const DEFAULT_CACHE_MAP_SIZE_MB: usize = 64;

/// Whether to warn when an expired cache is served because the network is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleCachePolicy {
    /// Notify the user with a warning.
    #[default]
    Warn,
    /// Serve the stale data without a notification.
    Silent,
}

/// Settings for the data load pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Dataset endpoint (JSON array of products).
    pub dataset_url: String,
    /// Directory of the persisted cache store.
    pub cache_path: PathBuf,
    #[serde(default = "default_map_size_mb")]
    pub cache_map_size_mb: usize,
    #[serde(default = "default_cache_expiry_secs")]
    pub cache_expiry_secs: u64,
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
    #[serde(default)]
    pub stale_cache_policy: StaleCachePolicy,
    /// Client-side request timeout. Absent means the HTTP stack decides.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_map_size_mb() -> usize {
    DEFAULT_CACHE_MAP_SIZE_MB
}

fn default_cache_expiry_secs() -> u64 {
    DEFAULT_CACHE_EXPIRY.as_secs()
}

fn default_resync_interval_secs() -> u64 {
    DEFAULT_RESYNC_INTERVAL.as_secs()
}

fn default_max_payload_bytes() -> u64 {
    DEFAULT_MAX_PAYLOAD_BYTES
}

impl SyncConfig {
    /// Create a config with default thresholds.
    pub fn new(dataset_url: impl Into<String>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            dataset_url: dataset_url.into(),
            cache_path: cache_path.into(),
            cache_map_size_mb: DEFAULT_CACHE_MAP_SIZE_MB,
            cache_expiry_secs: DEFAULT_CACHE_EXPIRY.as_secs(),
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL.as_secs(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            stale_cache_policy: StaleCachePolicy::default(),
            request_timeout_ms: None,
        }
    }

    pub fn with_cache_expiry(mut self, expiry: Duration) -> Self {
        self.cache_expiry_secs = expiry.as_secs();
        self
    }

    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval_secs = interval.as_secs();
        self
    }

    pub fn with_max_payload_bytes(mut self, limit: u64) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    pub fn with_stale_cache_policy(mut self, policy: StaleCachePolicy) -> Self {
        self.stale_cache_policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn cache_expiry(&self) -> Duration {
        Duration::from_secs(self.cache_expiry_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dataset_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "dataset_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !(self.dataset_url.starts_with("http://") || self.dataset_url.starts_with("https://"))
        {
            return Err(ConfigError::InvalidValue {
                field: "dataset_url",
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if self.cache_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cache_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.cache_map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache_map_size_mb",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache_expiry_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache_expiry_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.resync_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "resync_interval_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_payload_bytes",
                reason: "must be > 0".to_string(),
            });
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0 when set".to_string(),
            });
        }
        Ok(())
    }
}
