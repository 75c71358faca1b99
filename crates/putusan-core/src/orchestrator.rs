//! Fetch orchestration: pacing, retries, escalation.
//!
//! # Escalation states
//!
//! ```text
//! PRIMARY --[blocked, fallback enabled]--> FALLBACK
//!    |                                        |
//!    +--[retryable]--> backoff, PRIMARY       +--[retryable]--> backoff, FALLBACK
//!    +--[budget spent]--> EXHAUSTED           +--[budget spent]--> EXHAUSTED
//!    +--[success / terminal]--> done          +--[success / blocked / terminal]--> done
//! ```
//!
//! A fetch escalates at most once and never returns to PRIMARY.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;

use crate::classify::{BlockSignatures, Classification, classify, parse_retry_after};
use crate::config::EngineConfig;
use crate::error::AppError;
use crate::identity::IdentityPool;
use crate::models::{FetchOutcome, FetchRequest, FetchStatus, TransportKind};
use crate::policy::{DelayRange, FallbackPolicy, RetryPolicy};
use crate::stats::StatsCollector;
use crate::traits::{DebugSink, FallbackTransport, PauseKind, PrimaryTransport, Sleeper, TokioSleeper};

/// The only verb this system issues.
const REQUEST_METHOD: &str = "GET";

/// Which transport a fetch is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationState {
    Primary,
    Fallback,
}

/// Decision taken after an attempt has been classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Stop with this status.
    Done(FetchStatus),
    /// Back off, then try the same transport again.
    Retry,
    /// Switch to the fallback transport with a fresh budget.
    Escalate,
}

impl EscalationState {
    pub fn transport(&self) -> TransportKind {
        match self {
            EscalationState::Primary => TransportKind::Primary,
            EscalationState::Fallback => TransportKind::Fallback,
        }
    }

    /// Transition for a classified attempt.
    pub fn on_attempt(
        self,
        class: Classification,
        retries_permitted: bool,
        fallback_enabled: bool,
    ) -> Transition {
        match (self, class) {
            (_, Classification::Success) => Transition::Done(FetchStatus::Success),
            (EscalationState::Primary, Classification::Blocked) if fallback_enabled => {
                Transition::Escalate
            }
            (_, c) if c.is_retryable() && retries_permitted => Transition::Retry,
            (_, c) => Transition::Done(c.terminal_status()),
        }
    }

    /// Transition once the current transport's budget is spent.
    pub fn on_budget_spent(self, escalate_on_exhaustion: bool) -> Transition {
        match self {
            EscalationState::Primary if escalate_on_exhaustion => Transition::Escalate,
            _ => Transition::Done(FetchStatus::Exhausted),
        }
    }
}

/// Turns a [`FetchRequest`] into exactly one [`FetchOutcome`].
///
/// Generic over both transports and the sleeper, so every decision can be
/// exercised in tests without a network or a wall clock.
pub struct FetchOrchestrator<P, B, S = TokioSleeper> {
    primary: P,
    fallback: B,
    sleeper: S,
    identities: IdentityPool,
    retry: RetryPolicy,
    pacing: DelayRange,
    fallback_policy: FallbackPolicy,
    signatures: BlockSignatures,
    stats: StatsCollector,
    cancel: CancellationToken,
    debug_sink: Option<Arc<dyn DebugSink>>,
    rng: Mutex<StdRng>,
}

impl<P, B> FetchOrchestrator<P, B, TokioSleeper>
where
    P: PrimaryTransport,
    B: FallbackTransport,
{
    /// Build an orchestrator. Fails only if the configuration is invalid.
    pub fn new(
        primary: P,
        fallback: B,
        identities: IdentityPool,
        config: &EngineConfig,
        stats: StatsCollector,
    ) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            primary,
            fallback,
            sleeper: TokioSleeper,
            identities,
            retry: config.retry.clone(),
            pacing: config.pacing,
            fallback_policy: config.fallback.clone(),
            signatures: config.signatures.clone(),
            stats,
            cancel: CancellationToken::new(),
            debug_sink: None,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }
}

impl<P, B, S> FetchOrchestrator<P, B, S>
where
    P: PrimaryTransport,
    B: FallbackTransport,
    S: Sleeper,
{
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> FetchOrchestrator<P, B, S2> {
        FetchOrchestrator {
            primary: self.primary,
            fallback: self.fallback,
            sleeper,
            identities: self.identities,
            retry: self.retry,
            pacing: self.pacing,
            fallback_policy: self.fallback_policy,
            signatures: self.signatures,
            stats: self.stats,
            cancel: self.cancel,
            debug_sink: self.debug_sink,
            rng: self.rng,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_debug_sink(mut self, sink: Arc<dyn DebugSink>) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    /// Make pacing and jitter deterministic.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn fallback(&self) -> &B {
        &self.fallback
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolve one request. Network and HTTP failures end up in the
    /// outcome's status; this never panics or errors on them.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let started = Instant::now();
        let url = request.url();
        let unit_id = request.logical_unit_id();
        let retries_permitted = self.retry.permits_retry(REQUEST_METHOD);
        let fallback_enabled = self.fallback_policy.enabled;
        let primary_budget = self.primary_budget(request, retries_permitted);

        let mut state = EscalationState::Primary;
        let mut budget = primary_budget;
        let mut attempts_on_transport = 0u32;
        let mut attempts_made = 0u32;

        loop {
            if attempts_on_transport >= budget {
                let escalate = fallback_enabled && self.fallback_policy.escalate_on_exhaustion;
                if state.on_budget_spent(escalate) == Transition::Escalate {
                    self.log_escalation(unit_id, url, "primary budget exhausted");
                    state = EscalationState::Fallback;
                    budget = self.fallback_budget(primary_budget, retries_permitted);
                    attempts_on_transport = 0;
                } else {
                    tracing::warn!(
                        unit_id,
                        %url,
                        transport = %state.transport(),
                        attempts = attempts_made,
                        "Retry budget exhausted"
                    );
                    return FetchOutcome::failure(
                        request,
                        FetchStatus::Exhausted,
                        state.transport(),
                        started.elapsed(),
                        attempts_made,
                    );
                }
            }

            let pace = self.with_rng(|rng| self.pacing.sample(rng));
            if !self.pause(PauseKind::Pacing, pace).await || self.cancel.is_cancelled() {
                return self.cancelled(request, state, started, attempts_made);
            }

            let identity = self.identities.draw();
            let raw = match state {
                EscalationState::Primary => self.primary.send(url, &identity).await,
                EscalationState::Fallback => self.fallback.render(url, &identity).await,
            };
            attempts_made += 1;
            attempts_on_transport += 1;

            let class = classify(&raw, &self.retry, &self.signatures);
            self.stats.record_attempt(state.transport(), &class);
            if let (Some(sink), Some(body)) = (&self.debug_sink, raw.body.as_deref()) {
                sink.capture(state.transport(), url, body).await;
            }

            tracing::debug!(
                unit_id,
                transport = %state.transport(),
                attempt = attempts_on_transport,
                budget,
                class = %class,
                detail = raw.detail.as_deref().unwrap_or(""),
                "Attempt classified"
            );

            match state.on_attempt(class, retries_permitted, fallback_enabled) {
                Transition::Done(FetchStatus::Success) => {
                    return FetchOutcome::success(
                        request,
                        state.transport(),
                        raw.body.unwrap_or_default(),
                        started.elapsed(),
                        attempts_made,
                    );
                }
                Transition::Done(status) => {
                    return FetchOutcome::failure(
                        request,
                        status,
                        state.transport(),
                        started.elapsed(),
                        attempts_made,
                    );
                }
                Transition::Escalate => {
                    self.log_escalation(unit_id, url, "blocked by target");
                    state = EscalationState::Fallback;
                    budget = self.fallback_budget(primary_budget, retries_permitted);
                    attempts_on_transport = 0;
                }
                Transition::Retry => {
                    if attempts_on_transport >= budget {
                        continue;
                    }
                    let computed =
                        self.with_rng(|rng| self.retry.backoff_delay(attempts_on_transport, rng));
                    let retry_after = raw
                        .header("retry-after")
                        .and_then(|v| parse_retry_after(v, Utc::now()));
                    let delay = retry_after.map_or(computed, |ra| ra.max(computed));

                    tracing::info!(
                        unit_id,
                        transport = %state.transport(),
                        class = %class,
                        attempt = attempts_on_transport,
                        delay_ms = delay.as_millis() as u64,
                        retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                        "Backing off before retry"
                    );

                    if !self.pause(PauseKind::Backoff, delay).await {
                        return self.cancelled(request, state, started, attempts_made);
                    }
                }
            }
        }
    }

    fn primary_budget(&self, request: &FetchRequest, retries_permitted: bool) -> u32 {
        if !retries_permitted {
            return 1;
        }
        request
            .attempt_budget()
            .min(self.retry.max_attempts)
            .max(1)
    }

    /// Attempts allowed on the fallback after escalating.
    ///
    /// Strictly smaller than the primary budget, except when the primary
    /// budget is 1: the fallback still gets one render, so both equal 1.
    fn fallback_budget(&self, primary_budget: u32, retries_permitted: bool) -> u32 {
        if !retries_permitted {
            return 1;
        }
        self.fallback_policy
            .max_attempts
            .min(primary_budget.saturating_sub(1))
            .max(1)
    }

    fn log_escalation(&self, unit_id: u64, url: &str, reason: &str) {
        self.stats.record_escalation();
        tracing::info!(unit_id, %url, %reason, "Escalating to fallback transport");
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut *rng)
    }

    /// Sleep unless cancelled. Returns false if the run was cancelled.
    async fn pause(&self, kind: PauseKind, duration: Duration) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            () = self.sleeper.sleep(kind, duration) => true,
            () = self.cancel.cancelled() => false,
        }
    }

    fn cancelled(
        &self,
        request: &FetchRequest,
        state: EscalationState,
        started: Instant,
        attempts_made: u32,
    ) -> FetchOutcome {
        tracing::info!(unit_id = request.logical_unit_id(), "Fetch cancelled");
        FetchOutcome::failure(
            request,
            FetchStatus::Cancelled,
            state.transport(),
            started.elapsed(),
            attempts_made,
        )
    }
}
