//! Sync dispatch tuning.
//!
//! # Invariants
//! - `batch_size`, `base_backoff_ms`, and `stale_after_ms` are non-zero.
//! - `max_backoff_ms >= base_backoff_ms`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5 * 60 * 1_000;
pub const DEFAULT_STALE_AFTER_MS: u64 = 5 * 60 * 1_000;
pub const DEFAULT_BATCH_SIZE: u32 = 50;

/// Retry/backoff policy for draining the sync queue.
///
/// Deserializes from partial JSON; missing fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Retryable failures allowed before an operation is marked failed.
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// `in_progress` operations older than this are considered abandoned.
    pub stale_after_ms: u64,
    /// Operations claimed per pass.
    pub batch_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            stale_after_ms: DEFAULT_STALE_AFTER_MS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Rejected sync configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncConfigError {
    ZeroBatchSize,
    ZeroBaseBackoff,
    ZeroStaleAfter,
    MaxBackoffBelowBase { base_ms: u64, max_ms: u64 },
    Json(String),
}

impl Display for SyncConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroBatchSize => write!(f, "sync batch_size must be greater than zero"),
            Self::ZeroBaseBackoff => write!(f, "sync base_backoff_ms must be greater than zero"),
            Self::ZeroStaleAfter => write!(f, "sync stale_after_ms must be greater than zero"),
            Self::MaxBackoffBelowBase { base_ms, max_ms } => write!(
                f,
                "sync max_backoff_ms ({max_ms}) is below base_backoff_ms ({base_ms})"
            ),
            Self::Json(message) => write!(f, "invalid sync config json: {message}"),
        }
    }
}

impl Error for SyncConfigError {}

impl SyncConfig {
    /// Parses a JSON override document and validates the result.
    pub fn from_json(value: &str) -> Result<Self, SyncConfigError> {
        let config: Self =
            serde_json::from_str(value).map_err(|err| SyncConfigError::Json(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SyncConfigError> {
        if self.batch_size == 0 {
            return Err(SyncConfigError::ZeroBatchSize);
        }
        if self.base_backoff_ms == 0 {
            return Err(SyncConfigError::ZeroBaseBackoff);
        }
        if self.stale_after_ms == 0 {
            return Err(SyncConfigError::ZeroStaleAfter);
        }
        if self.max_backoff_ms < self.base_backoff_ms {
            return Err(SyncConfigError::MaxBackoffBelowBase {
                base_ms: self.base_backoff_ms,
                max_ms: self.max_backoff_ms,
            });
        }
        Ok(())
    }

    /// Delay before attempt number `retry_count + 1`.
    ///
    /// `base * 2^retry_count`, capped at `max_backoff_ms`.
    pub fn backoff_ms(&self, retry_count: u32) -> u64 {
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        self.base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }
}
