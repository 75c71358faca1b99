use std::collections::BTreeSet;
use std::time::Duration;

use crate::classify::BlockSignatures;
use crate::error::AppError;
use crate::policy::{DelayRange, FallbackPolicy, RetryPolicy};

/// Typed policy inputs for one run.
///
/// The engine does not care where these values come from; [`from_env`]
/// is provided for the CLI, which may override individual fields.
///
/// [`from_env`]: EngineConfig::from_env
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
    /// Delay drawn before every attempt.
    pub pacing: DelayRange,
    pub retry: RetryPolicy,
    pub fallback: FallbackPolicy,
    pub signatures: BlockSignatures,
    /// Fsync the checkpoint every N commits.
    pub checkpoint_sync_interval: u32,
    /// Terminal HTTP statuses that mark a unit as permanently skipped.
    pub skip_statuses: BTreeSet<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            pacing: DelayRange::default(),
            retry: RetryPolicy::default(),
            fallback: FallbackPolicy::default(),
            signatures: BlockSignatures::default(),
            checkpoint_sync_interval: 10,
            skip_statuses: [404, 410].into_iter().collect(),
        }
    }
}

impl EngineConfig {
    /// Read overrides from environment variables.
    ///
    /// - `PUTUSAN_REQUEST_TIMEOUT_SECS` (default 30)
    /// - `PUTUSAN_MIN_DELAY_MS` / `PUTUSAN_MAX_DELAY_MS` (default 1000 / 3000)
    /// - `PUTUSAN_MAX_RETRIES` (primary attempts, default 3)
    /// - `PUTUSAN_CHECKPOINT_INTERVAL` (default 10)
    /// - `PUTUSAN_FALLBACK_ENABLED` (`true`/`false`, default true)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64>(&lookup, "PUTUSAN_REQUEST_TIMEOUT_SECS")? {
            if secs == 0 {
                return Err(AppError::ConfigError(
                    "PUTUSAN_REQUEST_TIMEOUT_SECS must be at least 1".into(),
                ));
            }
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "PUTUSAN_MIN_DELAY_MS")? {
            config.pacing.min = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "PUTUSAN_MAX_DELAY_MS")? {
            config.pacing.max = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, "PUTUSAN_MAX_RETRIES")? {
            config.retry.max_attempts = attempts;
            // Keep the browser budget strictly below the primary one.
            config.fallback.max_attempts = config
                .fallback
                .max_attempts
                .min(attempts.saturating_sub(1))
                .max(1);
        }
        if let Some(interval) = parse_var::<u32>(&lookup, "PUTUSAN_CHECKPOINT_INTERVAL")? {
            config.checkpoint_sync_interval = interval;
        }
        if let Some(enabled) = parse_var::<bool>(&lookup, "PUTUSAN_FALLBACK_ENABLED")? {
            config.fallback.enabled = enabled;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.request_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "request_timeout must be non-zero".into(),
            ));
        }
        if self.checkpoint_sync_interval == 0 {
            return Err(AppError::ConfigError(
                "checkpoint_sync_interval must be at least 1".into(),
            ));
        }
        self.pacing.validate("pacing")?;
        self.retry.validate()?;
        self.fallback.validate(&self.retry)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, AppError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            AppError::ConfigError(format!("Invalid {key} '{raw}'"))
        }),
    }
}
