use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form metadata stored alongside a checkpoint.
pub type RunMetadata = BTreeMap<String, serde_json::Value>;

/// Which transport served an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Pooled HTTP client.
    Primary,
    /// Scripted headless browser.
    Fallback,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Primary => "primary",
            TransportKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal status of a resolved [`FetchRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    HttpError(u16),
    Timeout,
    DnsFailure,
    TlsFailure,
    ConnectionReset,
    Blocked,
    Exhausted,
    /// The run was cancelled while this unit was in flight.
    Cancelled,
}

impl FetchStatus {
    /// Stable label used for counters, logs and CSV reports.
    pub fn label(&self) -> String {
        match self {
            FetchStatus::Success => "success".into(),
            FetchStatus::HttpError(code) => format!("http_{code}"),
            FetchStatus::Timeout => "timeout".into(),
            FetchStatus::DnsFailure => "dns_failure".into(),
            FetchStatus::TlsFailure => "tls_failure".into(),
            FetchStatus::ConnectionReset => "connection_reset".into(),
            FetchStatus::Blocked => "blocked".into(),
            FetchStatus::Exhausted => "exhausted".into(),
            FetchStatus::Cancelled => "cancelled".into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchStatus::Success)
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A request to resolve one logical unit into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    url: String,
    logical_unit_id: u64,
    attempt_budget: u32,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, logical_unit_id: u64, attempt_budget: u32) -> Self {
        Self {
            url: url.into(),
            logical_unit_id,
            attempt_budget,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn logical_unit_id(&self) -> u64 {
        self.logical_unit_id
    }

    pub fn attempt_budget(&self) -> u32 {
        self.attempt_budget
    }
}

/// The single result produced for every [`FetchRequest`].
///
/// A `Success` outcome always carries a non-empty payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    unit_id: u64,
    url: String,
    status: FetchStatus,
    transport_used: TransportKind,
    payload: Option<String>,
    elapsed: Duration,
    attempts_made: u32,
}

impl FetchOutcome {
    pub fn success(
        request: &FetchRequest,
        transport_used: TransportKind,
        payload: String,
        elapsed: Duration,
        attempts_made: u32,
    ) -> Self {
        debug_assert!(!payload.is_empty(), "success outcome without payload");
        Self {
            unit_id: request.logical_unit_id(),
            url: request.url().to_string(),
            status: FetchStatus::Success,
            transport_used,
            payload: Some(payload),
            elapsed,
            attempts_made,
        }
    }

    pub fn failure(
        request: &FetchRequest,
        status: FetchStatus,
        transport_used: TransportKind,
        elapsed: Duration,
        attempts_made: u32,
    ) -> Self {
        debug_assert!(!status.is_success());
        Self {
            unit_id: request.logical_unit_id(),
            url: request.url().to_string(),
            status,
            transport_used,
            payload: None,
            elapsed,
            attempts_made,
        }
    }

    pub fn unit_id(&self) -> u64 {
        self.unit_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> FetchStatus {
        self.status
    }

    pub fn transport_used(&self) -> TransportKind {
        self.transport_used
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn into_payload(self) -> Option<String> {
        self.payload
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Low-level failure reported by a transport, before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Dns,
    Tls,
    /// Refused, reset or otherwise broken connection.
    Connection,
}

/// Facts reported by a transport for one attempt.
///
/// Transports never decide anything; the orchestrator classifies this.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResult {
    pub http_status: Option<u16>,
    /// Header names are lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub error: Option<TransportErrorKind>,
    /// Human-readable detail for logs.
    pub detail: Option<String>,
}

impl RawResult {
    pub fn response(status: u16, body: impl Into<String>) -> Self {
        Self {
            http_status: Some(status),
            body: Some(body.into()),
            ..Default::default()
        }
    }

    pub fn transport_error(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            error: Some(kind),
            detail: Some(detail.into()),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// The client identity presented for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub user_agent: String,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

impl IdentityRecord {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            extra_headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }
}

/// Durable marker of the last unit that was completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_completed_unit: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub run_metadata: RunMetadata,
}

impl Checkpoint {
    pub fn new(last_completed_unit: u64, run_metadata: RunMetadata) -> Self {
        Self {
            last_completed_unit,
            timestamp: Utc::now(),
            run_metadata,
        }
    }

    /// The unit a resumed run should start from.
    pub fn next_unit(&self) -> u64 {
        self.last_completed_unit.saturating_add(1)
    }

    /// Returns the URL template this checkpoint was recorded for, if any.
    pub fn target(&self) -> Option<&str> {
        self.run_metadata.get("target").and_then(|v| v.as_str())
    }
}
