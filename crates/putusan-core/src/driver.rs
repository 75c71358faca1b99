//! Page-sequence driver: walks a contiguous range of listing pages.
//!
//! Units are fetched one at a time in strictly increasing order. Every
//! outcome goes to the [`OutcomeSink`]. The checkpoint is a contiguous
//! watermark: it moves over successes and permanently skipped units, and
//! stops at the first failure of the run.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Checkpoint, FetchOutcome, FetchRequest, FetchStatus, RunMetadata, TransportKind};
use crate::orchestrator::FetchOrchestrator;
use crate::stats::Statistics;
use crate::traits::{CheckpointStore, FallbackTransport, OutcomeSink, PrimaryTransport, Sleeper};

/// Listing pages of the Supreme Court decision directory.
pub const DEFAULT_TEMPLATE: &str = "https://putusan3.mahkamahagung.go.id/direktori?page={unit}";

const PLACEHOLDER: &str = "{unit}";

/// A URL with a `{unit}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn parse(template: &str) -> Result<Self, AppError> {
        let template = template.trim();
        if !template.contains(PLACEHOLDER) {
            return Err(AppError::ConfigError(format!(
                "Invalid URL template '{template}': missing {PLACEHOLDER} placeholder"
            )));
        }
        let sample_url = template.replace(PLACEHOLDER, "1");
        let parsed = url::Url::parse(&sample_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid URL template '{template}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "Invalid URL template '{template}': scheme must be http or https"
            )));
        }
        Ok(Self(template.to_string()))
    }

    pub fn render(&self, unit: u64) -> String {
        self.0.replace(PLACEHOLDER, &unit.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UrlTemplate {
    fn default() -> Self {
        Self(DEFAULT_TEMPLATE.to_string())
    }
}

/// Position within the run, for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// 1-based index of the unit within this run.
    pub position: u64,
    pub total: u64,
    /// Remaining time, extrapolated from the average so far.
    pub eta: Option<Duration>,
}

/// Events emitted by the driver for monitoring/logging.
#[derive(Debug, Clone)]
pub enum DriverEvent<'a> {
    Started {
        run_id: Uuid,
        first_unit: u64,
        last_unit: u64,
    },
    Resumed {
        from: u64,
        checkpoint: &'a Checkpoint,
    },
    CheckpointIgnored {
        recorded_target: &'a str,
    },
    UnitCompleted {
        outcome: &'a FetchOutcome,
        progress: Progress,
    },
    UnitFailed {
        outcome: &'a FetchOutcome,
        /// The failure is permanent and the unit was skipped.
        skipped: bool,
        progress: Progress,
    },
    Cancelled {
        unit_id: u64,
    },
    Finished {
        summary: &'a RunSummary,
    },
}

/// Trait for receiving driver events (decoupled logging).
pub trait DriverReporter: Send + Sync {
    fn report(&self, event: DriverEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDriverReporter;

impl DriverReporter for TracingDriverReporter {
    fn report(&self, event: DriverEvent<'_>) {
        match event {
            DriverEvent::Started {
                run_id,
                first_unit,
                last_unit,
            } => {
                tracing::info!(%run_id, first_unit, last_unit, "Run started");
            }
            DriverEvent::Resumed { from, checkpoint } => {
                tracing::info!(
                    from,
                    last_completed = checkpoint.last_completed_unit,
                    saved_at = %checkpoint.timestamp,
                    "Resuming from checkpoint"
                );
            }
            DriverEvent::CheckpointIgnored { recorded_target } => {
                tracing::warn!(%recorded_target, "Checkpoint belongs to another target, ignoring it");
            }
            DriverEvent::UnitCompleted { outcome, progress } => {
                tracing::info!(
                    unit_id = outcome.unit_id(),
                    transport = %outcome.transport_used(),
                    attempts = outcome.attempts_made(),
                    elapsed_ms = outcome.elapsed_ms(),
                    position = progress.position,
                    total = progress.total,
                    eta_secs = progress.eta.map(|d| d.as_secs()),
                    "Unit completed"
                );
            }
            DriverEvent::UnitFailed {
                outcome,
                skipped: true,
                ..
            } => {
                tracing::info!(
                    unit_id = outcome.unit_id(),
                    status = %outcome.status(),
                    "Unit skipped"
                );
            }
            DriverEvent::UnitFailed {
                outcome, progress, ..
            } => {
                tracing::warn!(
                    unit_id = outcome.unit_id(),
                    class = %outcome.status(),
                    transport = %outcome.transport_used(),
                    attempts = outcome.attempts_made(),
                    position = progress.position,
                    total = progress.total,
                    "Unit failed"
                );
            }
            DriverEvent::Cancelled { unit_id } => {
                tracing::info!(unit_id, "Run cancelled");
            }
            DriverEvent::Finished { summary } => {
                tracing::info!(
                    run_id = %summary.run_id,
                    processed = summary.units_processed,
                    succeeded = summary.succeeded,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    last_committed = summary.last_committed_unit,
                    cancelled = summary.cancelled,
                    "Run finished"
                );
            }
        }
    }
}

/// A unit that ended in a failure status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUnit {
    pub unit_id: u64,
    pub url: String,
    pub status: String,
    pub attempts: u32,
    pub transport: TransportKind,
}

impl From<&FetchOutcome> for FailedUnit {
    fn from(outcome: &FetchOutcome) -> Self {
        Self {
            unit_id: outcome.unit_id(),
            url: outcome.url().to_string(),
            status: outcome.status().label(),
            attempts: outcome.attempts_made(),
            transport: outcome.transport_used(),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub target: String,
    pub first_unit: u64,
    pub last_unit: u64,
    pub units_processed: u64,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub outcomes_by_status: BTreeMap<String, u64>,
    pub failed_units: Vec<FailedUnit>,
    pub last_committed_unit: Option<u64>,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub statistics: Statistics,
}

/// Drives a [`FetchOrchestrator`] over a unit range with checkpointing.
pub struct PageSequenceDriver<P, B, S, C> {
    orchestrator: FetchOrchestrator<P, B, S>,
    store: C,
    template: UrlTemplate,
    skip_statuses: BTreeSet<u16>,
}

impl<P, B, S, C> PageSequenceDriver<P, B, S, C>
where
    P: PrimaryTransport,
    B: FallbackTransport,
    S: Sleeper,
    C: CheckpointStore,
{
    pub fn new(orchestrator: FetchOrchestrator<P, B, S>, store: C, template: UrlTemplate) -> Self {
        Self {
            orchestrator,
            store,
            template,
            skip_statuses: [404, 410].into_iter().collect(),
        }
    }

    /// Terminal HTTP statuses that count as permanently skipped.
    pub fn with_skip_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.skip_statuses = statuses.into_iter().collect();
        self
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator<P, B, S> {
        &self.orchestrator
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    pub fn template(&self) -> &UrlTemplate {
        &self.template
    }

    /// Fetch units `start..=end`, resuming after the checkpoint if asked.
    ///
    /// Per-unit failures are reported in the summary. Only configuration,
    /// checkpoint and sink errors abort the run.
    pub async fn run<O, R>(
        &self,
        start: u64,
        end: u64,
        resume: bool,
        sink: &O,
        reporter: &R,
    ) -> Result<RunSummary, AppError>
    where
        O: OutcomeSink,
        R: DriverReporter,
    {
        if start == 0 {
            return Err(AppError::ConfigError("start unit must be at least 1".into()));
        }
        if start > end {
            return Err(AppError::ConfigError(format!(
                "start unit {start} is after end unit {end}"
            )));
        }

        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let first_unit = if resume {
            self.resume_point(start, reporter).await
        } else {
            start
        };

        let mut summary = RunSummary {
            run_id,
            target: self.template.as_str().to_string(),
            first_unit,
            last_unit: end,
            units_processed: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            outcomes_by_status: BTreeMap::new(),
            failed_units: Vec::new(),
            last_committed_unit: None,
            cancelled: false,
            elapsed_ms: 0,
            statistics: Statistics::default(),
        };

        reporter.report(DriverEvent::Started {
            run_id,
            first_unit,
            last_unit: end,
        });

        let total = end.saturating_sub(first_unit).saturating_add(1);
        let budget = self.orchestrator.retry_policy().max_attempts;
        let cancel = self.orchestrator.cancellation_token().clone();
        let mut watermark_held = false;

        if first_unit <= end {
            for unit in first_unit..=end {
                if cancel.is_cancelled() {
                    summary.cancelled = true;
                    reporter.report(DriverEvent::Cancelled { unit_id: unit });
                    break;
                }

                let request = FetchRequest::new(self.template.render(unit), unit, budget);
                let outcome = self.orchestrator.fetch(&request).await;

                if outcome.status() == FetchStatus::Cancelled {
                    summary.cancelled = true;
                    reporter.report(DriverEvent::Cancelled { unit_id: unit });
                    break;
                }

                sink.deliver(&outcome).await?;

                summary.units_processed += 1;
                *summary
                    .outcomes_by_status
                    .entry(outcome.status().label())
                    .or_insert(0) += 1;

                let progress = progress(summary.units_processed, total, started.elapsed());
                let skipped = self.is_permanent_skip(outcome.status());

                if outcome.is_success() {
                    summary.succeeded += 1;
                    reporter.report(DriverEvent::UnitCompleted {
                        outcome: &outcome,
                        progress,
                    });
                } else {
                    if skipped {
                        summary.skipped += 1;
                    } else {
                        summary.failed += 1;
                        summary.failed_units.push(FailedUnit::from(&outcome));
                        watermark_held = true;
                    }
                    reporter.report(DriverEvent::UnitFailed {
                        outcome: &outcome,
                        skipped,
                        progress,
                    });
                }

                if !watermark_held && (outcome.is_success() || skipped) {
                    self.store
                        .commit(unit, self.metadata(run_id, &outcome))
                        .await?;
                    summary.last_committed_unit = Some(unit);
                }
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        summary.statistics = self.orchestrator.stats().snapshot();
        reporter.report(DriverEvent::Finished { summary: &summary });
        Ok(summary)
    }

    async fn resume_point<R: DriverReporter>(&self, start: u64, reporter: &R) -> u64 {
        let Some(checkpoint) = self.store.load().await else {
            return start;
        };
        if let Some(recorded) = checkpoint.target()
            && recorded != self.template.as_str()
        {
            reporter.report(DriverEvent::CheckpointIgnored {
                recorded_target: recorded,
            });
            return start;
        }
        let from = start.max(checkpoint.next_unit());
        reporter.report(DriverEvent::Resumed {
            from,
            checkpoint: &checkpoint,
        });
        from
    }

    fn is_permanent_skip(&self, status: FetchStatus) -> bool {
        matches!(status, FetchStatus::HttpError(code) if self.skip_statuses.contains(&code))
    }

    fn metadata(&self, run_id: Uuid, outcome: &FetchOutcome) -> RunMetadata {
        let mut meta = RunMetadata::new();
        meta.insert("target".into(), self.template.as_str().into());
        meta.insert("run_id".into(), run_id.to_string().into());
        meta.insert("status".into(), outcome.status().label().into());
        meta.insert("attempts".into(), outcome.attempts_made().into());
        meta.insert("transport".into(), outcome.transport_used().as_str().into());
        meta
    }
}

fn progress(done: u64, total: u64, elapsed: Duration) -> Progress {
    let remaining = total.saturating_sub(done);
    let eta = (done > 0).then(|| {
        let per_unit = elapsed / u32::try_from(done).unwrap_or(u32::MAX);
        per_unit.saturating_mul(u32::try_from(remaining).unwrap_or(u32::MAX))
    });
    Progress {
        position: done,
        total,
        eta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityPool;
    use crate::models::TransportErrorKind;
    use crate::models::RawResult;
    use crate::stats::StatsCollector;
    use crate::testutil::{
        CHALLENGE_HTML, MemoryCheckpointStore, MockFallback, MockPrimary, MockReporter,
        RecordingSink, RecordingSleeper, fast_config,
    };

    const TEMPLATE: &str = "https://example.test/direktori?page={unit}";

    type TestDriver =
        PageSequenceDriver<MockPrimary, MockFallback, RecordingSleeper, MemoryCheckpointStore>;

    fn driver(
        primary: MockPrimary,
        fallback: MockFallback,
        store: MemoryCheckpointStore,
    ) -> TestDriver {
        let orch = FetchOrchestrator::new(
            primary,
            fallback,
            IdentityPool::default(),
            &fast_config(),
            StatsCollector::new(),
        )
        .unwrap()
        .with_sleeper(RecordingSleeper::default())
        .with_seed(1);
        PageSequenceDriver::new(orch, store, UrlTemplate::parse(TEMPLATE).unwrap())
    }

    #[test]
    fn template_requires_placeholder_and_valid_url() {
        assert!(UrlTemplate::parse("https://example.test/direktori").is_err());
        assert!(UrlTemplate::parse("not a url {unit}").is_err());
        assert!(UrlTemplate::parse("ftp://example.test/{unit}").is_err());
        let t = UrlTemplate::parse(TEMPLATE).unwrap();
        assert_eq!(t.render(12), "https://example.test/direktori?page=12");
        assert_eq!(UrlTemplate::default().as_str(), DEFAULT_TEMPLATE);
    }

    #[test]
    fn eta_extrapolates_average() {
        let p = progress(2, 5, Duration::from_secs(4));
        assert_eq!(p.eta, Some(Duration::from_secs(6)));
        assert_eq!(progress(0, 5, Duration::ZERO).eta, None);
    }

    #[tokio::test]
    async fn units_are_processed_in_order() {
        let primary = MockPrimary::default();
        let store = MemoryCheckpointStore::empty();
        let sink = RecordingSink::default();
        let d = driver(primary.clone(), MockFallback::default(), store.clone());

        let summary = d.run(1, 4, false, &sink, &MockReporter::default()).await.unwrap();

        assert_eq!(sink.unit_ids(), vec![1, 2, 3, 4]);
        assert_eq!(
            primary.urls(),
            (1..=4)
                .map(|u| format!("https://example.test/direktori?page={u}"))
                .collect::<Vec<_>>()
        );
        assert_eq!(store.committed(), vec![1, 2, 3, 4]);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.last_committed_unit, Some(4));
        assert_eq!(summary.statistics.total_successes, 4);
    }

    #[tokio::test]
    async fn checkpoint_metadata_is_recorded() {
        let store = MemoryCheckpointStore::empty();
        let d = driver(MockPrimary::default(), MockFallback::default(), store.clone());

        let summary = d
            .run(1, 1, false, &RecordingSink::default(), &MockReporter::default())
            .await
            .unwrap();

        let cp = store.last().unwrap();
        assert_eq!(cp.last_completed_unit, 1);
        assert_eq!(cp.target(), Some(TEMPLATE));
        assert_eq!(cp.run_metadata["run_id"], summary.run_id.to_string());
        assert_eq!(cp.run_metadata["status"], "success");
        assert_eq!(cp.run_metadata["attempts"], 1);
        assert_eq!(cp.run_metadata["transport"], "primary");
    }

    #[tokio::test]
    async fn resume_starts_after_checkpoint() {
        let primary = MockPrimary::default();
        let store = MemoryCheckpointStore::at(5, TEMPLATE);
        let sink = RecordingSink::default();
        let reporter = MockReporter::default();
        let d = driver(primary.clone(), MockFallback::default(), store.clone());

        let summary = d.run(1, 8, true, &sink, &reporter).await.unwrap();

        assert_eq!(sink.unit_ids(), vec![6, 7, 8]);
        assert_eq!(summary.first_unit, 6);
        assert!(reporter.events().contains(&"resumed:6".to_string()));
    }

    #[tokio::test]
    async fn resume_never_goes_below_start() {
        let store = MemoryCheckpointStore::at(2, TEMPLATE);
        let sink = RecordingSink::default();
        let d = driver(MockPrimary::default(), MockFallback::default(), store);

        d.run(5, 6, true, &sink, &MockReporter::default()).await.unwrap();

        assert_eq!(sink.unit_ids(), vec![5, 6]);
    }

    #[tokio::test]
    async fn resume_past_end_does_nothing() {
        let primary = MockPrimary::default();
        let store = MemoryCheckpointStore::at(10, TEMPLATE);
        let d = driver(primary.clone(), MockFallback::default(), store.clone());

        let summary = d
            .run(1, 10, true, &RecordingSink::default(), &MockReporter::default())
            .await
            .unwrap();

        assert_eq!(summary.units_processed, 0);
        assert_eq!(primary.call_count(), 0);
        assert!(store.committed().is_empty());
    }

    #[tokio::test]
    async fn checkpoint_for_other_target_is_ignored() {
        let store = MemoryCheckpointStore::at(5, "https://elsewhere.test/?p={unit}");
        let sink = RecordingSink::default();
        let reporter = MockReporter::default();
        let d = driver(MockPrimary::default(), MockFallback::default(), store);

        d.run(1, 2, true, &sink, &reporter).await.unwrap();

        assert_eq!(sink.unit_ids(), vec![1, 2]);
        assert!(reporter.events().contains(&"checkpoint_ignored".to_string()));
    }

    #[tokio::test]
    async fn without_resume_checkpoint_is_not_consulted() {
        let store = MemoryCheckpointStore::at(5, TEMPLATE);
        let sink = RecordingSink::default();
        let d = driver(MockPrimary::default(), MockFallback::default(), store);

        d.run(1, 2, false, &sink, &MockReporter::default()).await.unwrap();

        assert_eq!(sink.unit_ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn exhausted_unit_holds_checkpoint_and_run_continues() {
        // Unit 1 ok, unit 2 blocked on primary and times out twice on the
        // browser, unit 3 ok.
        let primary = MockPrimary::with_responses(vec![
            RawResult::response(200, "<html>page one</html>"),
            RawResult::response(403, CHALLENGE_HTML),
            RawResult::response(200, "<html>page three</html>"),
        ]);
        let fallback = MockFallback::with_responses(vec![
            RawResult::transport_error(TransportErrorKind::Timeout, "page load"),
            RawResult::transport_error(TransportErrorKind::Timeout, "page load"),
        ]);
        let store = MemoryCheckpointStore::empty();
        let sink = RecordingSink::default();
        let reporter = MockReporter::default();
        let d = driver(primary, fallback, store.clone());

        let summary = d.run(1, 3, false, &sink, &reporter).await.unwrap();

        assert_eq!(sink.unit_ids(), vec![1, 2, 3]);
        assert_eq!(store.committed(), vec![1]);
        assert_eq!(store.last().unwrap().last_completed_unit, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed_units[0].unit_id, 2);
        assert_eq!(summary.failed_units[0].status, "exhausted");
        assert_eq!(summary.outcomes_by_status["exhausted"], 1);
        assert_eq!(summary.last_committed_unit, Some(1));
        assert!(reporter.events().contains(&"failed:2".to_string()));
    }

    #[tokio::test]
    async fn skipped_units_advance_checkpoint() {
        let primary = MockPrimary::with_responses(vec![
            RawResult::response(200, "<html>one</html>"),
            RawResult::response(404, "not found"),
            RawResult::response(200, "<html>three</html>"),
        ]);
        let store = MemoryCheckpointStore::empty();
        let d = driver(primary, MockFallback::default(), store.clone());

        let summary = d
            .run(1, 3, false, &RecordingSink::default(), &MockReporter::default())
            .await
            .unwrap();

        assert_eq!(store.committed(), vec![1, 2, 3]);
        assert_eq!(summary.skipped, 1);
        assert!(summary.failed_units.is_empty());
    }

    #[tokio::test]
    async fn restart_after_failure_refetches_failed_unit() {
        let store = MemoryCheckpointStore::empty();
        let first = driver(
            MockPrimary::with_responses(vec![
                RawResult::response(200, "<html>one</html>"),
                RawResult::transport_error(TransportErrorKind::Tls, "handshake"),
            ]),
            MockFallback::default(),
            store.clone(),
        );
        first
            .run(1, 3, false, &RecordingSink::default(), &MockReporter::default())
            .await
            .unwrap();
        assert_eq!(store.last().unwrap().last_completed_unit, 1);

        let sink = RecordingSink::default();
        let second = driver(MockPrimary::default(), MockFallback::default(), store.clone());
        second.run(1, 3, true, &sink, &MockReporter::default()).await.unwrap();

        assert_eq!(sink.unit_ids(), vec![2, 3]);
        assert_eq!(store.last().unwrap().last_completed_unit, 3);
    }

    #[tokio::test]
    async fn rerun_of_completed_range_is_idempotent() {
        let store = MemoryCheckpointStore::empty();
        let d = driver(MockPrimary::default(), MockFallback::default(), store.clone());
        d.run(1, 3, true, &RecordingSink::default(), &MockReporter::default())
            .await
            .unwrap();
        let before = store.last().unwrap().last_completed_unit;

        d.run(1, 3, true, &RecordingSink::default(), &MockReporter::default())
            .await
            .unwrap();

        assert_eq!(before, 3);
        assert_eq!(store.last().unwrap().last_completed_unit, 3);
        assert_eq!(store.committed(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn cancelled_run_stops_without_commit() {
        let primary = MockPrimary::default();
        let store = MemoryCheckpointStore::empty();
        let reporter = MockReporter::default();
        let d = driver(primary.clone(), MockFallback::default(), store.clone());
        d.orchestrator().cancellation_token().cancel();

        let summary = d
            .run(1, 3, false, &RecordingSink::default(), &reporter)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(primary.call_count(), 0);
        assert!(store.committed().is_empty());
        assert_eq!(reporter.events(), vec!["started", "cancelled:1", "finished"]);
    }

    #[tokio::test]
    async fn invalid_range_is_config_error() {
        let d = driver(
            MockPrimary::default(),
            MockFallback::default(),
            MemoryCheckpointStore::empty(),
        );
        let sink = RecordingSink::default();
        let reporter = MockReporter::default();

        assert!(d.run(0, 3, false, &sink, &reporter).await.unwrap_err().is_config());
        assert!(d.run(4, 3, false, &sink, &reporter).await.unwrap_err().is_config());
    }

    #[tokio::test]
    async fn sink_error_aborts_run() {
        let store = MemoryCheckpointStore::empty();
        let d = driver(MockPrimary::default(), MockFallback::default(), store.clone());
        let sink = RecordingSink::with_error(AppError::SinkError("disk full".into()));

        let err = d.run(1, 3, false, &sink, &MockReporter::default()).await.unwrap_err();

        assert!(matches!(err, AppError::SinkError(_)));
        assert!(store.committed().is_empty());
    }

    #[tokio::test]
    async fn checkpoint_error_aborts_run() {
        let d = driver(
            MockPrimary::default(),
            MockFallback::default(),
            MemoryCheckpointStore::failing(),
        );

        let err = d
            .run(1, 3, false, &RecordingSink::default(), &MockReporter::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::CheckpointError(_)));
    }
}
