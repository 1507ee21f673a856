//! In-process metrics sink.
//!
//! Atomic counters and a fixed-bucket latency histogram shared between
//! the engine, the queue admission path, and the action executor.
//! Everything is lock-free except the labelled action counter, which
//! sits behind a mutex off the hot path. A [`snapshot`] feeds the
//! periodic structured log line and the tests.
//!
//! [`snapshot`]: SimMetrics::snapshot

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

/// Upper bounds of the event-latency histogram buckets, in ms. The
/// last bucket is unbounded.
const LATENCY_BUCKETS_MS: [f64; 9] = [1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

/// Shared metrics sink.
#[derive(Debug, Default)]
pub struct SimMetrics {
    /// Current queue depth (gauge).
    queue_length: AtomicU64,
    /// Admission refusals and evictions.
    queue_full_total: AtomicU64,
    /// Events popped and dispatched.
    events_processed_total: AtomicU64,
    /// Batches dropped after exhausting retries (mirrored from the
    /// repository at snapshot time when linked).
    batch_commit_errors_total: AtomicU64,
    /// Runs in non-terminal status owned by this process (gauge, 0/1).
    simulations_active: AtomicU64,
    /// Applied actions, labelled by kind and profession.
    actions_total: Mutex<BTreeMap<(String, &'static str), u64>>,
    /// Event processing latency histogram (bucket counts + sum).
    latency_counts: [AtomicU64; 10],
    latency_sum_ms: AtomicU64,
}

impl SimMetrics {
    /// Create a fresh sink behind an [`Arc`].
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record the current queue depth.
    pub fn set_queue_length(&self, len: usize) {
        self.queue_length.store(len as u64, Ordering::Relaxed);
    }

    /// Count one admission refusal or eviction.
    pub fn incr_queue_full(&self) {
        self.queue_full_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one dispatched event.
    pub fn incr_events_processed(&self) {
        self.events_processed_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Overwrite the dropped-batch counter with the repository's total.
    pub fn set_batch_commit_errors(&self, total: u64) {
        self.batch_commit_errors_total.store(total, Ordering::Relaxed);
    }

    /// Set the active-simulations gauge.
    pub fn set_simulations_active(&self, active: u64) {
        self.simulations_active.store(active, Ordering::Relaxed);
    }

    /// Count one applied action.
    pub fn record_action(&self, kind: &str, profession: &'static str) {
        if let Ok(mut counters) = self.actions_total.lock() {
            *counters.entry((kind.to_owned(), profession)).or_insert(0) += 1;
        }
    }

    /// Observe one event's processing latency.
    pub fn observe_latency_ms(&self, latency_ms: f64) {
        let bucket = LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| latency_ms <= *bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.latency_counts[bucket].fetch_add(1, Ordering::Relaxed);
        // Microsecond resolution is plenty for a sum.
        self.latency_sum_ms
            .fetch_add((latency_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    /// Point-in-time snapshot for logging and assertions.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let actions_total = self
            .actions_total
            .lock()
            .map(|counters| {
                counters
                    .iter()
                    .map(|((kind, profession), count)| {
                        (format!("{kind}{{profession={profession}}}"), *count)
                    })
                    .collect()
            })
            .unwrap_or_default();

        MetricsSnapshot {
            queue_length: self.queue_length.load(Ordering::Relaxed),
            queue_full_total: self.queue_full_total.load(Ordering::Relaxed),
            events_processed_total: self.events_processed_total.load(Ordering::Relaxed),
            batch_commit_errors_total: self.batch_commit_errors_total.load(Ordering::Relaxed),
            simulations_active: self.simulations_active.load(Ordering::Relaxed),
            actions_total,
            event_latency_buckets: self
                .latency_counts
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
            event_latency_sum_ms: self.latency_sum_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Serializable view of the metrics at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Current queue depth.
    pub queue_length: u64,
    /// Admission refusals and evictions so far.
    pub queue_full_total: u64,
    /// Events dispatched so far.
    pub events_processed_total: u64,
    /// Batches dropped after exhausting retries.
    pub batch_commit_errors_total: u64,
    /// Runs in non-terminal status owned by this process.
    pub simulations_active: u64,
    /// Applied actions, `kind{profession=...}` to count.
    pub actions_total: BTreeMap<String, u64>,
    /// Latency histogram bucket counts (last bucket unbounded).
    pub event_latency_buckets: Vec<u64>,
    /// Sum of observed latencies in ms.
    pub event_latency_sum_ms: f64,
}

impl MetricsSnapshot {
    /// Total count across all actions with the given kind.
    pub fn actions_of_kind(&self, kind: &str) -> u64 {
        let prefix = format!("{kind}{{");
        self.actions_total
            .iter()
            .filter(|(label, _)| label.starts_with(&prefix))
            .map(|(_, count)| count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = SimMetrics::shared();
        metrics.incr_queue_full();
        metrics.incr_queue_full();
        metrics.incr_events_processed();
        metrics.set_queue_length(7);
        metrics.set_simulations_active(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queue_full_total, 2);
        assert_eq!(snapshot.events_processed_total, 1);
        assert_eq!(snapshot.queue_length, 7);
        assert_eq!(snapshot.simulations_active, 1);
    }

    #[test]
    fn labelled_actions() {
        let metrics = SimMetrics::shared();
        metrics.record_action("Post", "Developer");
        metrics.record_action("Post", "Teacher");
        metrics.record_action("Purchase_L1", "Teacher");
        metrics.record_action("Post", "Developer");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.actions_of_kind("Post"), 3);
        assert_eq!(snapshot.actions_of_kind("Purchase_L1"), 1);
        assert_eq!(
            snapshot.actions_total.get("Post{profession=Developer}"),
            Some(&2)
        );
    }

    #[test]
    fn latency_buckets() {
        let metrics = SimMetrics::shared();
        metrics.observe_latency_ms(0.5); // bucket 0 (<= 1ms)
        metrics.observe_latency_ms(30.0); // bucket 4 (<= 50ms)
        metrics.observe_latency_ms(9999.0); // overflow bucket

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.event_latency_buckets[0], 1);
        assert_eq!(snapshot.event_latency_buckets[4], 1);
        assert_eq!(snapshot.event_latency_buckets[9], 1);
        assert!((snapshot.event_latency_sum_ms - 10_029.5).abs() < 0.01);
    }
}
