use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{Checkpoint, FetchOutcome, IdentityRecord, RawResult, RunMetadata, TransportKind};

/// Low-cost transport: a pooled HTTP client.
///
/// Reports facts only. Must not retry and must not fail: every condition is
/// described by the returned [`RawResult`].
pub trait PrimaryTransport: Send + Sync {
    fn send(
        &self,
        url: &str,
        identity: &IdentityRecord,
    ) -> impl Future<Output = RawResult> + Send;
}

/// Expensive transport: a scripted browser, used after escalation.
pub trait FallbackTransport: Send + Sync {
    fn render(
        &self,
        url: &str,
        identity: &IdentityRecord,
    ) -> impl Future<Output = RawResult> + Send;

    /// Release external resources (browser processes) at the end of a run.
    fn shutdown(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Stand-in used when no browser transport is available.
///
/// The orchestrator never escalates to it because fallback is disabled
/// whenever it is used; if it is reached anyway it reports a broken
/// connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl FallbackTransport for NoFallback {
    async fn render(&self, _url: &str, _identity: &IdentityRecord) -> RawResult {
        RawResult::transport_error(
            crate::models::TransportErrorKind::Connection,
            "no fallback transport configured",
        )
    }
}

/// What a pause is for, so callers can tell pacing from backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    Pacing,
    Backoff,
}

/// Suspends the current task. Abstracted so tests can observe delays.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, kind: PauseKind, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, _kind: PauseKind, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Durable record of the last completed unit.
pub trait CheckpointStore: Send + Sync {
    /// Returns `None` for a missing or unreadable record. Never fails.
    fn load(&self) -> impl Future<Output = Option<Checkpoint>> + Send;

    /// Atomically replace the record.
    fn commit(
        &self,
        unit_id: u64,
        metadata: RunMetadata,
    ) -> impl Future<Output = Result<Checkpoint, AppError>> + Send;
}

/// Downstream consumer of resolved units (the HTML-extraction side).
pub trait OutcomeSink: Send + Sync {
    fn deliver(&self, outcome: &FetchOutcome) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A no-op OutcomeSink for use when payloads are not kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutcomeSink for NullSink {
    async fn deliver(&self, _outcome: &FetchOutcome) -> Result<(), AppError> {
        Ok(())
    }
}

/// Receives the raw body of every attempt for offline inspection.
///
/// Implementations swallow and log their own errors.
#[async_trait]
pub trait DebugSink: Send + Sync {
    async fn capture(&self, transport: TransportKind, url: &str, body: &str);
}
