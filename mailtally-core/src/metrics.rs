//! Run metrics shared between the ingestion worker and status readers.
//!
//! # Invariants
//! - Exactly one run may hold the slot; the claim is a single compare-and-set.
//! - `messages_processed` is bumped before extraction is attempted and
//!   `valid_sender_messages` after, so readers never see more valid senders
//!   than processed messages.
//! - Tally entries are created already holding their first count.

use std::{
    cmp::Ordering as CmpOrdering,
    fmt,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::types::{IngestionReport, SenderMetrics};

/// Storage port for ingestion metrics.
///
/// Mutating methods are driven by the single ingestion worker that holds the
/// run slot. Snapshot methods may be called from any number of tasks at any
/// time and must never block behind the worker.
pub trait MetricsRepository: Send + Sync + fmt::Debug {
    /// Marks the beginning of a run. Returns `false` if one is already active.
    fn try_start_run(&self) -> bool;

    /// Marks the end of the active run.
    fn finish_run(&self);

    /// Clears counters and the sender tally for a freshly claimed run.
    fn reset(&self);

    fn is_running(&self) -> bool;

    /// Counts one regular-file entry as attempted.
    fn increment_processed(&self);

    /// Counts one message with a valid sender and bumps that sender's tally.
    fn record_sender(&self, sender: &str);

    fn snapshot_status(&self) -> IngestionReport;

    /// Highest-count senders, descending by count, ties by ascending sender.
    fn snapshot_top_senders(&self, limit: usize) -> Vec<SenderMetrics>;
}

/// Lock-light in-memory [`MetricsRepository`].
///
/// Counters are plain atomics; the tally is a sharded [`DashMap`] of atomic
/// counts so an increment only touches the shard owning that sender.
#[derive(Default)]
pub struct InMemoryMetrics {
    running: AtomicBool,
    messages_processed: AtomicU64,
    valid_sender_messages: AtomicU64,
    sender_counts: DashMap<String, AtomicU64>,
}

impl fmt::Debug for InMemoryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMetrics")
            .field("running", &self.running.load(Ordering::Relaxed))
            .field(
                "messages_processed",
                &self.messages_processed.load(Ordering::Relaxed),
            )
            .field(
                "valid_sender_messages",
                &self.valid_sender_messages.load(Ordering::Relaxed),
            )
            .field("distinct_senders", &self.sender_counts.len())
            .finish()
    }
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct senders in the current tally.
    pub fn distinct_senders(&self) -> usize {
        self.sender_counts.len()
    }
}

impl MetricsRepository for InMemoryMetrics {
    fn try_start_run(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish_run(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn reset(&self) {
        self.valid_sender_messages.store(0, Ordering::Release);
        self.messages_processed.store(0, Ordering::Release);
        self.sender_counts.clear();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn increment_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Release);
    }

    fn record_sender(&self, sender: &str) {
        // Fast path only takes the shard read lock.
        if let Some(count) = self.sender_counts.get(sender) {
            count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sender_counts
                .entry(sender.to_owned())
                .and_modify(|count| {
                    count.fetch_add(1, Ordering::Relaxed);
                })
                .or_insert_with(|| AtomicU64::new(1));
        }
        self.valid_sender_messages.fetch_add(1, Ordering::Release);
    }

    fn snapshot_status(&self) -> IngestionReport {
        // Load order matters: valid before processed.
        let valid = self.valid_sender_messages.load(Ordering::Acquire);
        let processed = self.messages_processed.load(Ordering::Acquire);
        IngestionReport {
            running: self.running.load(Ordering::Acquire),
            messages_processed: processed,
            // A reset racing this read can pair a stale valid count with a
            // zeroed processed count.
            valid_sender_messages: valid.min(processed),
        }
    }

    fn snapshot_top_senders(&self, limit: usize) -> Vec<SenderMetrics> {
        if limit == 0 {
            return Vec::new();
        }

        let mut senders: Vec<SenderMetrics> = self
            .sender_counts
            .iter()
            .map(|entry| {
                SenderMetrics::new(
                    entry.key().clone(),
                    entry.value().load(Ordering::Relaxed),
                )
            })
            .collect();

        if senders.len() > limit {
            senders.select_nth_unstable_by(limit, rank);
            senders.truncate(limit);
        }
        senders.sort_unstable_by(rank);
        senders
    }
}

fn rank(a: &SenderMetrics, b: &SenderMetrics) -> CmpOrdering {
    b.count
        .cmp(&a.count)
        .then_with(|| a.sender.cmp(&b.sender))
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc, Barrier,
            atomic::{AtomicBool, Ordering},
        },
        thread,
    };

    use super::*;

    fn record_many(metrics: &InMemoryMetrics, sender: &str, times: u64) {
        for _ in 0..times {
            metrics.increment_processed();
            metrics.record_sender(sender);
        }
    }

    #[test]
    fn start_run_is_single_flight() {
        let metrics = InMemoryMetrics::new();

        assert!(metrics.try_start_run());
        assert!(!metrics.try_start_run());
        assert!(metrics.is_running());

        metrics.finish_run();
        assert!(!metrics.is_running());
        assert!(metrics.try_start_run());
    }

    #[test]
    fn concurrent_claims_have_exactly_one_winner() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    metrics.try_start_run()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn reset_clears_counters_and_tally() {
        let metrics = InMemoryMetrics::new();
        record_many(&metrics, "a@example.com", 3);
        metrics.increment_processed();

        metrics.reset();

        let status = metrics.snapshot_status();
        assert_eq!(status.messages_processed, 0);
        assert_eq!(status.valid_sender_messages, 0);
        assert_eq!(metrics.distinct_senders(), 0);
        assert!(metrics.snapshot_top_senders(10).is_empty());
    }

    #[test]
    fn record_sender_creates_then_increments() {
        let metrics = InMemoryMetrics::new();
        record_many(&metrics, "a@example.com", 2);
        record_many(&metrics, "b@example.com", 1);

        let top = metrics.snapshot_top_senders(10);
        assert_eq!(
            top,
            vec![
                SenderMetrics::new("a@example.com", 2),
                SenderMetrics::new("b@example.com", 1),
            ]
        );
        let status = metrics.snapshot_status();
        assert_eq!(status.messages_processed, 3);
        assert_eq!(status.valid_sender_messages, 3);
    }

    #[test]
    fn top_senders_breaks_ties_lexicographically() {
        let metrics = InMemoryMetrics::new();
        record_many(&metrics, "D", 11);
        record_many(&metrics, "B", 12);
        record_many(&metrics, "C", 11);
        record_many(&metrics, "A", 13);
        record_many(&metrics, "E", 2);

        let top = metrics.snapshot_top_senders(3);
        let names: Vec<_> = top.iter().map(|s| s.sender.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(top[2].count, 11);
    }

    #[test]
    fn top_senders_limit_larger_than_tally_returns_all() {
        let metrics = InMemoryMetrics::new();
        record_many(&metrics, "x", 1);
        record_many(&metrics, "y", 4);

        let top = metrics.snapshot_top_senders(50);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].sender, "y");
        assert!(metrics.snapshot_top_senders(0).is_empty());
    }

    #[test]
    fn readers_never_observe_more_valid_than_processed() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut observations = 0u64;
                    while !done.load(Ordering::Acquire) {
                        let status = metrics.snapshot_status();
                        assert!(
                            status.valid_sender_messages
                                <= status.messages_processed
                        );
                        let top = metrics.snapshot_top_senders(5);
                        assert!(top.windows(2).all(|w| w[0].count >= w[1].count));
                        observations += 1;
                    }
                    observations
                })
            })
            .collect();

        for i in 0..20_000u64 {
            metrics.increment_processed();
            if i % 3 != 0 {
                metrics.record_sender(&format!("sender{}", i % 17));
            }
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            reader.join().unwrap();
        }

        let status = metrics.snapshot_status();
        assert_eq!(status.messages_processed, 20_000);
        assert_eq!(status.valid_sender_messages, 13_333);
        let tallied: u64 = metrics
            .snapshot_top_senders(usize::MAX)
            .iter()
            .map(|s| s.count)
            .sum();
        assert_eq!(tallied, 13_333);
    }
}
