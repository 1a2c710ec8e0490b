//! Loader configuration.
//!
//! A [`LoaderConfig`] travels with a loader and is inherited by every batch of
//! children created through it.
//!
//! # Environment Variables
//!
//! - `TURBO_MAX_BATCH_SIZE` - Split child fetches into round trips of at most N ids
//! - `TURBO_CANCEL_POLICY=retry|cache` - What a cancelled fetch leaves behind
//! - `TURBO_FETCH_TIMEOUT_MS` - Default fetch timeout in milliseconds
//!
//! ```rust
//! use std::time::Duration;
//! use turbo_loader::{CancelPolicy, LoaderConfig};
//!
//! let config = LoaderConfig::new()
//!     .with_max_batch_size(500)
//!     .with_cancel_policy(CancelPolicy::CacheError)
//!     .with_fetch_timeout(Duration::from_secs(5));
//!
//! assert!(config.validate().is_ok());
//! ```

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, LoadResult};

/// Environment variable holding the maximum child batch size.
pub const ENV_MAX_BATCH_SIZE: &str = "TURBO_MAX_BATCH_SIZE";
/// Environment variable holding the cancellation policy.
pub const ENV_CANCEL_POLICY: &str = "TURBO_CANCEL_POLICY";
/// Environment variable holding the default fetch timeout.
pub const ENV_FETCH_TIMEOUT_MS: &str = "TURBO_FETCH_TIMEOUT_MS";

/// What a memo cell keeps after its fetch was cancelled or timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Return the error to the interrupted caller and leave the cell pending,
    /// so the next caller runs the fetch again.
    #[default]
    Retry,
    /// Cache the cancellation as the cell's terminal error.
    CacheError,
}

impl CancelPolicy {
    /// Parse a policy name (`retry` or `cache`).
    pub fn parse(value: &str) -> LoadResult<Self> {
        match value.trim().to_lowercase().as_str() {
            "retry" => Ok(Self::Retry),
            "cache" | "cache_error" => Ok(Self::CacheError),
            other => Err(LoadError::invalid_configuration(format!(
                "unknown cancel policy '{}'",
                other
            ))
            .with_suggestion("Use 'retry' or 'cache'")),
        }
    }

    /// Check if interrupted fetches are cached.
    pub fn caches_error(&self) -> bool {
        matches!(self, Self::CacheError)
    }
}

/// Configuration shared by a loader and the batches it spawns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Maximum number of parent ids per child round trip. `None` issues one round trip.
    pub max_batch_size: Option<usize>,
    /// Behavior when a fetch is interrupted.
    pub cancel_policy: CancelPolicy,
    /// Timeout applied when the caller's context carries none.
    pub fetch_timeout: Option<Duration>,
}

impl LoaderConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the configuration from `TURBO_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> LoadResult<Self> {
        let mut config = Self::default();

        if let Ok(raw) = env::var(ENV_MAX_BATCH_SIZE) {
            let size = raw.trim().parse::<usize>().map_err(|e| {
                LoadError::invalid_configuration(format!("{} must be an integer", ENV_MAX_BATCH_SIZE))
                    .with_source(e)
            })?;
            config.max_batch_size = Some(size);
        }

        if let Ok(raw) = env::var(ENV_CANCEL_POLICY) {
            config.cancel_policy = CancelPolicy::parse(&raw)?;
        }

        if let Ok(raw) = env::var(ENV_FETCH_TIMEOUT_MS) {
            let ms = raw.trim().parse::<u64>().map_err(|e| {
                LoadError::invalid_configuration(format!("{} must be an integer", ENV_FETCH_TIMEOUT_MS))
                    .with_source(e)
            })?;
            config.fetch_timeout = Some(Duration::from_millis(ms));
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the maximum child batch size.
    #[must_use]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }

    /// Set the cancellation policy.
    #[must_use]
    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }

    /// Set the default fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Check the configuration for values the loader cannot honor.
    pub fn validate(&self) -> LoadResult<()> {
        if self.max_batch_size == Some(0) {
            return Err(LoadError::invalid_configuration("max_batch_size must be at least 1"));
        }
        if self.fetch_timeout == Some(Duration::ZERO) {
            return Err(LoadError::invalid_configuration("fetch_timeout must be non-zero"));
        }
        Ok(())
    }
}
