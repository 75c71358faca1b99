//! Retry, pacing and fallback policies.
//!
//! All policies are plain data, validated once when the orchestrator is
//! built and read-only afterwards.
//!
//! # Backoff schedule
//!
//! The delay after the `n`th failed attempt on a transport (`n` from 1) is
//!
//! ```text
//! base_backoff × backoff_multiplier^n × U(1 - jitter_fraction, 1 + jitter_fraction)
//! ```
//!
//! A server-supplied `Retry-After` replaces this value when it is larger.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;

use crate::error::AppError;

/// Verbs that may be retried without side effects.
const IDEMPOTENT_METHODS: &[&str] = &["GET", "HEAD", "OPTIONS", "PUT", "DELETE", "TRACE"];

/// Upper bound for a computed backoff, keeps `Duration` arithmetic finite.
const MAX_NOMINAL_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Declarative retry policy for the primary transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// HTTP statuses that are worth another attempt.
    pub retryable_status_codes: BTreeSet<u16>,

    /// Methods that may be retried. Only `GET` is ever issued.
    pub allowed_methods: BTreeSet<String>,

    /// Maximum attempts on the primary transport, first attempt included.
    pub max_attempts: u32,

    /// Delay before the first retry, before jitter.
    pub base_backoff: Duration,

    /// Growth factor between consecutive retries.
    pub backoff_multiplier: f64,

    /// Relative jitter in `[0, 1)`; `0.25` means ±25 %.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retryable_status_codes: [429, 500, 502, 503, 504].into_iter().collect(),
            allowed_methods: ["GET", "HEAD", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter_fraction: 0.25,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, multiplier: f64, jitter_fraction: f64) -> Self {
        self.base_backoff = base;
        self.backoff_multiplier = multiplier;
        self.jitter_fraction = jitter_fraction;
        self
    }

    pub fn with_retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn with_allowed_methods<S: Into<String>>(
        mut self,
        methods: impl IntoIterator<Item = S>,
    ) -> Self {
        self.allowed_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_attempts == 0 {
            return Err(AppError::ConfigError(
                "max_attempts must be at least 1".into(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(AppError::ConfigError(format!(
                "backoff_multiplier must be a finite number >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.jitter_fraction) {
            return Err(AppError::ConfigError(format!(
                "jitter_fraction must be in [0, 1), got {}",
                self.jitter_fraction
            )));
        }
        if let Some(code) = self
            .retryable_status_codes
            .iter()
            .find(|c| !(100..=599).contains(*c))
        {
            return Err(AppError::ConfigError(format!(
                "retryable status code {code} is not a valid HTTP status"
            )));
        }
        if let Some(method) = self
            .allowed_methods
            .iter()
            .find(|m| !IDEMPOTENT_METHODS.contains(&m.to_ascii_uppercase().as_str()))
        {
            return Err(AppError::ConfigError(format!(
                "method '{method}' is not idempotent and cannot be retried"
            )));
        }
        Ok(())
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Whether requests using `method` may be retried at all.
    pub fn permits_retry(&self, method: &str) -> bool {
        self.allowed_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Backoff after `attempt` failed attempts on one transport, without
    /// jitter: `base × multiplier^attempt`.
    pub fn nominal_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.base_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= MAX_NOMINAL_BACKOFF.as_secs_f64() {
            return MAX_NOMINAL_BACKOFF;
        }
        Duration::from_secs_f64(secs)
    }

    /// Inclusive bounds of the jittered backoff after `attempt` failures.
    pub fn backoff_bounds(&self, attempt: u32) -> (Duration, Duration) {
        let nominal = self.nominal_backoff(attempt);
        (
            nominal.mul_f64(1.0 - self.jitter_fraction),
            nominal.mul_f64(1.0 + self.jitter_fraction),
        )
    }

    /// Draw the jittered backoff after `attempt` failures.
    pub fn backoff_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_backoff(attempt);
        if self.jitter_fraction == 0.0 {
            return nominal;
        }
        let factor =
            rng.gen_range((1.0 - self.jitter_fraction)..=(1.0 + self.jitter_fraction));
        nominal.mul_f64(factor)
    }
}

/// A uniformly sampled delay range, used for pacing and settle waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// A range that always yields `delay`.
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay)
    }

    pub fn zero() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn validate(&self, name: &str) -> Result<(), AppError> {
        if self.min > self.max {
            return Err(AppError::ConfigError(format!(
                "{name}: min delay {}ms exceeds max delay {}ms",
                self.min.as_millis(),
                self.max.as_millis()
            )));
        }
        Ok(())
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min >= self.max {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rng.gen_range(min_ms..=max_ms))
    }
}

impl Default for DelayRange {
    /// 1–3 s between requests.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(3))
    }
}

/// Policy for escalating to the browser transport.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPolicy {
    pub enabled: bool,

    /// Attempt budget on the browser; must stay below the primary budget.
    pub max_attempts: u32,

    /// Also escalate when the primary budget is spent on retryable failures.
    pub escalate_on_exhaustion: bool,

    /// Navigation timeout for a single render.
    pub page_load_timeout: Duration,

    /// A browser session is recycled after this many renders.
    pub session_max_uses: u32,

    /// A browser session is recycled once it is this old.
    pub session_max_age: Duration,

    /// Wait after load so that dynamic content can settle.
    pub settle: DelayRange,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 2,
            escalate_on_exhaustion: false,
            page_load_timeout: Duration::from_secs(30),
            session_max_uses: 25,
            session_max_age: Duration::from_secs(10 * 60),
            settle: DelayRange::new(Duration::from_secs(2), Duration::from_secs(4)),
        }
    }
}

impl FallbackPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Validate against the primary retry policy.
    pub fn validate(&self, primary: &RetryPolicy) -> Result<(), AppError> {
        if self.max_attempts == 0 {
            return Err(AppError::ConfigError(
                "fallback max_attempts must be at least 1".into(),
            ));
        }
        if self.enabled && primary.max_attempts > 1 && self.max_attempts >= primary.max_attempts {
            return Err(AppError::ConfigError(format!(
                "fallback max_attempts ({}) must be smaller than primary max_attempts ({})",
                self.max_attempts, primary.max_attempts
            )));
        }
        if self.page_load_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "page_load_timeout must be non-zero".into(),
            ));
        }
        if self.session_max_uses == 0 {
            return Err(AppError::ConfigError(
                "session_max_uses must be at least 1".into(),
            ));
        }
        self.settle.validate("settle")
    }
}
