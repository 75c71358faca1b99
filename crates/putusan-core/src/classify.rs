//! Classification of raw transport results.
//!
//! Every attempt is reduced exactly once to a [`Classification`], a closed
//! enum the orchestrator matches exhaustively. Nothing downstream of this
//! module looks at status codes, headers or error strings.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{FetchStatus, RawResult, TransportErrorKind};
use crate::policy::RetryPolicy;

/// Outcome class of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Success,
    RetryableStatus(u16),
    FatalStatus(u16),
    Timeout,
    DnsFailure,
    ConnectionReset,
    TlsFailure,
    Blocked,
}

impl Classification {
    /// Label used for `failures_by_class` counters.
    pub fn label(&self) -> String {
        match self {
            Classification::Success => "success".into(),
            Classification::RetryableStatus(code) | Classification::FatalStatus(code) => {
                format!("http_{code}")
            }
            Classification::Timeout => "timeout".into(),
            Classification::DnsFailure => "dns_failure".into(),
            Classification::ConnectionReset => "connection_reset".into(),
            Classification::TlsFailure => "tls_failure".into(),
            Classification::Blocked => "blocked".into(),
        }
    }

    /// Transient conditions the backoff loop may recover from.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Classification::RetryableStatus(_)
                | Classification::Timeout
                | Classification::DnsFailure
                | Classification::ConnectionReset
        )
    }

    /// The terminal status reported when this class ends a fetch.
    pub fn terminal_status(&self) -> FetchStatus {
        match self {
            Classification::Success => FetchStatus::Success,
            Classification::RetryableStatus(code) | Classification::FatalStatus(code) => {
                FetchStatus::HttpError(*code)
            }
            Classification::Timeout => FetchStatus::Timeout,
            Classification::DnsFailure => FetchStatus::DnsFailure,
            Classification::ConnectionReset => FetchStatus::ConnectionReset,
            Classification::TlsFailure => FetchStatus::TlsFailure,
            Classification::Blocked => FetchStatus::Blocked,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Heuristics that recognise bot-defense responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSignatures {
    /// Statuses that always mean the client was refused.
    pub always_blocked_statuses: Vec<u16>,

    /// Statuses that mean "blocked" only when the body carries a marker.
    pub marker_statuses: Vec<u16>,

    /// Lower-case substrings found on challenge or interstitial pages.
    pub markers: Vec<String>,

    /// Successful responses shorter than this (after trimming) are suspicious.
    pub min_body_bytes: usize,
}

impl Default for BlockSignatures {
    fn default() -> Self {
        Self {
            always_blocked_statuses: vec![403, 406],
            marker_statuses: vec![429, 503],
            markers: [
                "cf-chl",
                "challenge-platform",
                "cf-browser-verification",
                "just a moment...",
                "attention required!",
                "checking your browser",
                "ddos-guard",
                "g-recaptcha",
                "h-captcha",
                "/cdn-cgi/challenge",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            min_body_bytes: 1,
        }
    }
}

impl BlockSignatures {
    pub fn has_marker(&self, body: &str) -> bool {
        if self.markers.is_empty() {
            return false;
        }
        let lower = body.to_lowercase();
        self.markers.iter().any(|m| lower.contains(m.as_str()))
    }

    fn is_suspiciously_empty(&self, body: Option<&str>) -> bool {
        body.map(|b| b.trim().len() < self.min_body_bytes.max(1))
            .unwrap_or(true)
    }
}

/// Reduce a raw transport result to a [`Classification`].
///
/// A missing HTTP status (browser renders) is treated as 200.
pub fn classify(raw: &RawResult, policy: &RetryPolicy, signatures: &BlockSignatures) -> Classification {
    if let Some(kind) = raw.error {
        return match kind {
            TransportErrorKind::Timeout => Classification::Timeout,
            TransportErrorKind::Dns => Classification::DnsFailure,
            TransportErrorKind::Tls => Classification::TlsFailure,
            TransportErrorKind::Connection => Classification::ConnectionReset,
        };
    }

    let status = raw.http_status.unwrap_or(200);
    let body = raw.body.as_deref();

    if signatures.always_blocked_statuses.contains(&status) {
        return Classification::Blocked;
    }

    if signatures.marker_statuses.contains(&status) && body.is_some_and(|b| signatures.has_marker(b))
    {
        return Classification::Blocked;
    }

    if (200..300).contains(&status) {
        if signatures.is_suspiciously_empty(body) {
            return Classification::Blocked;
        }
        if body.is_some_and(|b| signatures.has_marker(b)) {
            return Classification::Blocked;
        }
        return Classification::Success;
    }

    if policy.is_retryable_status(status) {
        Classification::RetryableStatus(status)
    } else {
        Classification::FatalStatus(status)
    }
}

/// Parse a `Retry-After` header value: delay-seconds or an HTTP-date.
///
/// Dates in the past yield `Duration::ZERO`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
