//! Process-wide fetch statistics.
//!
//! A [`StatsCollector`] is created once per process and passed explicitly to
//! the orchestrator. Clones share the same counters. Counters only grow.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::classify::Classification;
use crate::models::TransportKind;

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_attempts: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub failures_by_class: BTreeMap<String, u64>,
    pub transport_usage: BTreeMap<TransportKind, u64>,
    pub escalations: u64,
}

impl Statistics {
    /// Percentage of attempts that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        self.total_successes as f64 / self.total_attempts as f64 * 100.0
    }

    pub fn failures_of(&self, class: &str) -> u64 {
        self.failures_by_class.get(class).copied().unwrap_or(0)
    }

    pub fn usage_of(&self, transport: TransportKind) -> u64 {
        self.transport_usage.get(&transport).copied().unwrap_or(0)
    }
}

/// Shared, mutex-guarded counters.
///
/// Every update happens under one lock so a snapshot is always consistent
/// (`total_attempts == total_successes + total_failures`).
#[derive(Debug, Clone, Default)]
pub struct StatsCollector {
    inner: Arc<Mutex<Statistics>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Statistics> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Statistics recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Record one attempt and its classification.
    pub fn record_attempt(&self, transport: TransportKind, class: &Classification) {
        let mut stats = self.lock_inner();
        stats.total_attempts += 1;
        *stats.transport_usage.entry(transport).or_insert(0) += 1;
        if matches!(class, Classification::Success) {
            stats.total_successes += 1;
        } else {
            stats.total_failures += 1;
            *stats.failures_by_class.entry(class.label()).or_insert(0) += 1;
        }
    }

    /// Record a switch from the primary to the fallback transport.
    pub fn record_escalation(&self) {
        self.lock_inner().escalations += 1;
    }

    pub fn snapshot(&self) -> Statistics {
        self.lock_inner().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let stats = StatsCollector::new().snapshot();
        assert_eq!(stats, Statistics::default());
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn records_successes_and_failures() {
        let collector = StatsCollector::new();
        collector.record_attempt(TransportKind::Primary, &Classification::RetryableStatus(429));
        collector.record_attempt(TransportKind::Primary, &Classification::RetryableStatus(429));
        collector.record_attempt(TransportKind::Primary, &Classification::Blocked);
        collector.record_escalation();
        collector.record_attempt(TransportKind::Fallback, &Classification::Success);

        let stats = collector.snapshot();
        assert_eq!(stats.total_attempts, 4);
        assert_eq!(stats.total_successes, 1);
        assert_eq!(stats.total_failures, 3);
        assert_eq!(stats.failures_of("http_429"), 2);
        assert_eq!(stats.failures_of("blocked"), 1);
        assert_eq!(stats.failures_of("timeout"), 0);
        assert_eq!(stats.usage_of(TransportKind::Primary), 3);
        assert_eq!(stats.usage_of(TransportKind::Fallback), 1);
        assert_eq!(stats.escalations, 1);
        assert_eq!(stats.success_rate(), 25.0);
    }

    #[test]
    fn clones_share_counters() {
        let a = StatsCollector::new();
        let b = a.clone();
        b.record_attempt(TransportKind::Primary, &Classification::Success);
        assert_eq!(a.snapshot().total_successes, 1);
    }

    #[test]
    fn snapshot_serializes_transport_names() {
        let collector = StatsCollector::new();
        collector.record_attempt(TransportKind::Fallback, &Classification::Timeout);
        let json = serde_json::to_value(collector.snapshot()).unwrap();
        assert_eq!(json["transport_usage"]["fallback"], 1);
        assert_eq!(json["failures_by_class"]["timeout"], 1);
    }
}
