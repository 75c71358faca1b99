//! Test utilities: scripted transports and in-memory stores.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::driver::{DriverEvent, DriverReporter};
use crate::error::AppError;
use crate::models::{
    Checkpoint, FetchOutcome, IdentityRecord, RawResult, RunMetadata, TransportKind,
};
use crate::policy::DelayRange;
use crate::traits::{
    CheckpointStore, DebugSink, FallbackTransport, OutcomeSink, PauseKind, PrimaryTransport,
    Sleeper,
};

/// A well-formed listing page.
pub const LISTING_HTML: &str =
    "<html><body><table class=\"putusan\"><tr><td>1/Pdt.G/2024/PN Jkt.Sel</td></tr></table></body></html>";

/// A bot-defense interstitial.
pub const CHALLENGE_HTML: &str =
    "<html><head><title>Just a moment...</title></head><body><div id=\"cf-chl-widget\"></div></body></html>";

/// Engine config with no pacing, for fast deterministic tests.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        pacing: DelayRange::zero(),
        ..EngineConfig::default()
    }
}

// ---------------------------------------------------------------------------
// MockPrimary / MockFallback
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Script {
    responses: Arc<Mutex<Vec<RawResult>>>,
    calls: Arc<Mutex<Vec<(String, IdentityRecord)>>>,
}

impl Script {
    fn new(responses: Vec<RawResult>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn next(&self, url: &str, identity: &IdentityRecord, default: RawResult) -> RawResult {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), identity.clone()));
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            default
        } else {
            responses.remove(0)
        }
    }
}

/// Primary transport that replays a queue of results.
/// When the queue is empty it serves [`LISTING_HTML`].
#[derive(Clone, Default)]
pub struct MockPrimary {
    script: Script,
}

impl MockPrimary {
    pub fn with_responses(responses: Vec<RawResult>) -> Self {
        Self {
            script: Script::new(responses),
        }
    }

    pub fn call_count(&self) -> usize {
        self.script.calls.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.script
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.script
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, id)| id.user_agent.clone())
            .collect()
    }
}

impl PrimaryTransport for MockPrimary {
    async fn send(&self, url: &str, identity: &IdentityRecord) -> RawResult {
        self.script
            .next(url, identity, RawResult::response(200, LISTING_HTML))
    }
}

/// Fallback transport that replays a queue of results.
#[derive(Clone, Default)]
pub struct MockFallback {
    script: Script,
}

impl MockFallback {
    pub fn with_responses(responses: Vec<RawResult>) -> Self {
        Self {
            script: Script::new(responses),
        }
    }

    pub fn call_count(&self) -> usize {
        self.script.calls.lock().unwrap().len()
    }
}

impl FallbackTransport for MockFallback {
    async fn render(&self, url: &str, identity: &IdentityRecord) -> RawResult {
        let rendered = RawResult {
            body: Some(LISTING_HTML.to_string()),
            ..Default::default()
        };
        self.script.next(url, identity, rendered)
    }
}

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

/// Sleeper that returns immediately and records every requested pause.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    pub pauses: Arc<Mutex<Vec<(PauseKind, Duration)>>>,
}

impl RecordingSleeper {
    pub fn backoffs(&self) -> Vec<Duration> {
        self.pauses
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| *kind == PauseKind::Backoff)
            .map(|(_, d)| *d)
            .collect()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, kind: PauseKind, duration: Duration) {
        self.pauses.lock().unwrap().push((kind, duration));
    }
}

/// Sleeper that never finishes, for cancellation tests.
#[derive(Clone, Copy, Default)]
pub struct PendingSleeper;

impl Sleeper for PendingSleeper {
    async fn sleep(&self, _kind: PauseKind, _duration: Duration) {
        std::future::pending::<()>().await
    }
}

// ---------------------------------------------------------------------------
// RecordingDebugSink
// ---------------------------------------------------------------------------

/// Debug sink keeping every captured body in memory.
#[derive(Clone, Default)]
pub struct RecordingDebugSink {
    pub captures: Arc<Mutex<Vec<(TransportKind, String, String)>>>,
}

impl RecordingDebugSink {
    pub fn transports(&self) -> Vec<TransportKind> {
        self.captures.lock().unwrap().iter().map(|(t, _, _)| *t).collect()
    }
}

#[async_trait]
impl DebugSink for RecordingDebugSink {
    async fn capture(&self, transport: TransportKind, url: &str, body: &str) {
        tokio::task::yield_now().await;
        self.captures
            .lock()
            .unwrap()
            .push((transport, url.to_string(), body.to_string()));
    }
}

// ---------------------------------------------------------------------------
// MemoryCheckpointStore
// ---------------------------------------------------------------------------

/// In-memory checkpoint store recording every commit.
#[derive(Clone, Default)]
pub struct MemoryCheckpointStore {
    current: Arc<Mutex<Option<Checkpoint>>>,
    pub commits: Arc<Mutex<Vec<u64>>>,
    fail_commits: Arc<Mutex<bool>>,
}

impl MemoryCheckpointStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn at(last_completed_unit: u64, target: &str) -> Self {
        let mut meta = RunMetadata::new();
        meta.insert("target".into(), serde_json::json!(target));
        let store = Self::default();
        *store.current.lock().unwrap() = Some(Checkpoint::new(last_completed_unit, meta));
        store
    }

    pub fn failing() -> Self {
        let store = Self::default();
        *store.fail_commits.lock().unwrap() = true;
        store
    }

    pub fn last(&self) -> Option<Checkpoint> {
        self.current.lock().unwrap().clone()
    }

    pub fn committed(&self) -> Vec<u64> {
        self.commits.lock().unwrap().clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Option<Checkpoint> {
        self.current.lock().unwrap().clone()
    }

    async fn commit(&self, unit_id: u64, metadata: RunMetadata) -> Result<Checkpoint, AppError> {
        if *self.fail_commits.lock().unwrap() {
            return Err(AppError::CheckpointError("disk full".into()));
        }
        let checkpoint = Checkpoint::new(unit_id, metadata);
        *self.current.lock().unwrap() = Some(checkpoint.clone());
        self.commits.lock().unwrap().push(unit_id);
        Ok(checkpoint)
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Outcome sink that keeps everything it receives.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub outcomes: Arc<Mutex<Vec<FetchOutcome>>>,
    error: Arc<Mutex<Option<AppError>>>,
}

impl RecordingSink {
    pub fn with_error(error: AppError) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(Vec::new())),
            error: Arc::new(Mutex::new(Some(error))),
        }
    }

    pub fn unit_ids(&self) -> Vec<u64> {
        self.outcomes
            .lock()
            .unwrap()
            .iter()
            .map(FetchOutcome::unit_id)
            .collect()
    }
}

impl OutcomeSink for RecordingSink {
    async fn deliver(&self, outcome: &FetchOutcome) -> Result<(), AppError> {
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        self.outcomes.lock().unwrap().push(outcome.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records event names for assertions.
#[derive(Clone, Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl DriverReporter for MockReporter {
    fn report(&self, event: DriverEvent<'_>) {
        let name = match event {
            DriverEvent::Started { .. } => "started".to_string(),
            DriverEvent::Resumed { from, .. } => format!("resumed:{from}"),
            DriverEvent::CheckpointIgnored { .. } => "checkpoint_ignored".to_string(),
            DriverEvent::UnitCompleted { outcome, .. } => format!("completed:{}", outcome.unit_id()),
            DriverEvent::UnitFailed { outcome, .. } => format!("failed:{}", outcome.unit_id()),
            DriverEvent::Cancelled { unit_id } => format!("cancelled:{unit_id}"),
            DriverEvent::Finished { .. } => "finished".to_string(),
        };
        self.events.lock().unwrap().push(name);
    }
}
