// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable retry queue for submissions that could not be delivered.
//!
//! The whole queue lives under one fixed key and is read and written
//! wholesale on every operation. Entries are bounded by count (oldest evicted
//! first) and by age.

use crate::models::Submission;
use crate::services::delivery::{DeliveryOutcome, Transport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage key of the persisted queue.
pub const QUEUE_KEY: &str = "py_collect_queue_v1";

/// A submission waiting for another delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedSubmission {
    pub submission: Submission,
    pub queued_at: DateTime<Utc>,
}

/// Queue storage errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Queue serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistence for the queue contents.
pub trait QueueStore: Send + Sync {
    /// Read the whole queue. Missing or unreadable data reads as empty.
    fn load(&self) -> Vec<QueuedSubmission>;

    /// Replace the whole queue.
    fn save(&self, entries: &[QueuedSubmission]) -> Result<(), QueueError>;
}

impl<S: QueueStore> QueueStore for std::sync::Arc<S> {
    fn load(&self) -> Vec<QueuedSubmission> {
        (**self).load()
    }

    fn save(&self, entries: &[QueuedSubmission]) -> Result<(), QueueError> {
        (**self).save(entries)
    }
}

/// JSON file named after [`QUEUE_KEY`] inside a directory.
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", QUEUE_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl QueueStore for FileQueueStore {
    fn load(&self) -> Vec<QueuedSubmission> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "Failed to read retry queue");
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, path = %self.path.display(), "Discarding corrupt retry queue");
            Vec::new()
        })
    }

    fn save(&self, entries: &[QueuedSubmission]) -> Result<(), QueueError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write then rename so a crash never leaves a truncated queue.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-process queue storage.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    entries: Mutex<Vec<QueuedSubmission>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<QueuedSubmission>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl QueueStore for MemoryQueueStore {
    fn load(&self) -> Vec<QueuedSubmission> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn save(&self, entries: &[QueuedSubmission]) -> Result<(), QueueError> {
        *self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = entries.to_vec();
        Ok(())
    }
}

/// Outcome counts of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub rejected: usize,
    pub remaining: usize,
    pub evicted: usize,
}

/// Bounded retry queue over a [`QueueStore`].
pub struct RetryQueue<S> {
    store: S,
    max_len: usize,
    max_age: chrono::Duration,
}

impl<S: QueueStore> RetryQueue<S> {
    pub fn new(store: S, max_len: usize, max_age: chrono::Duration) -> Self {
        Self {
            store,
            max_len,
            max_age,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Live entries, oldest first.
    pub fn entries(&self) -> Vec<QueuedSubmission> {
        let mut entries = self.store.load();
        self.enforce_bounds(&mut entries, Utc::now());
        entries
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a submission. Returns how many old entries were evicted.
    pub fn push(&self, submission: Submission) -> Result<usize, QueueError> {
        let now = Utc::now();
        let mut entries = self.store.load();
        entries.push(QueuedSubmission {
            submission,
            queued_at: now,
        });

        let evicted = self.enforce_bounds(&mut entries, now);
        if evicted > 0 {
            tracing::warn!(evicted, max_len = self.max_len, "Retry queue full, evicted oldest entries");
        }

        self.store.save(&entries)?;
        Ok(evicted)
    }

    /// Retry every queued submission, one at a time, in order.
    ///
    /// Delivered and rejected entries are removed; failed entries stay in
    /// their original order. The store is rewritten after every removal, so
    /// an interrupted pass never resends an entry that already went through.
    pub async fn drain<T: Transport>(&self, transport: &T) -> DrainReport {
        let mut entries = self.store.load();
        let mut report = DrainReport {
            evicted: self.enforce_bounds(&mut entries, Utc::now()),
            ..Default::default()
        };

        if entries.is_empty() {
            if report.evicted > 0 {
                self.persist(&entries);
            }
            return report;
        }

        let mut remaining = Vec::with_capacity(entries.len());
        let mut unsent: VecDeque<QueuedSubmission> = entries.into();
        while let Some(entry) = unsent.pop_front() {
            match transport.deliver(&entry.submission).await {
                DeliveryOutcome::Delivered => report.delivered += 1,
                DeliveryOutcome::Rejected { reason } => {
                    tracing::warn!(reason = %reason, "Dropping queued submission rejected by endpoint");
                    report.rejected += 1;
                }
                DeliveryOutcome::Failed { reason } => {
                    tracing::debug!(reason = %reason, "Queued submission still undeliverable");
                    remaining.push(entry);
                    continue;
                }
            }

            let snapshot: Vec<QueuedSubmission> =
                remaining.iter().chain(unsent.iter()).cloned().collect();
            self.persist(&snapshot);
        }

        report.remaining = remaining.len();
        self.persist(&remaining);

        tracing::info!(
            delivered = report.delivered,
            rejected = report.rejected,
            remaining = report.remaining,
            evicted = report.evicted,
            "Retry queue drained"
        );
        report
    }

    fn persist(&self, entries: &[QueuedSubmission]) {
        if let Err(e) = self.store.save(entries) {
            tracing::warn!(error = %e, "Failed to persist retry queue");
        }
    }

    /// Drop expired entries, then the oldest beyond `max_len`.
    fn enforce_bounds(&self, entries: &mut Vec<QueuedSubmission>, now: DateTime<Utc>) -> usize {
        let before = entries.len();
        entries.retain(|e| now - e.queued_at <= self.max_age);

        if entries.len() > self.max_len {
            let excess = entries.len() - self.max_len;
            entries.drain(..excess);
        }

        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn submission(name: &str) -> Submission {
        Submission {
            name: name.to_string(),
            grade: "六年级".to_string(),
            class_name: "3班".to_string(),
            l3_moves: 8,
            v_seen: false,
            time_sec: None,
            timestamp: None,
            meta: Map::new(),
        }
    }

    fn names(entries: &[QueuedSubmission]) -> Vec<String> {
        entries.iter().map(|e| e.submission.name.clone()).collect()
    }

    /// Delivers the first submission, then never answers again.
    #[derive(Default)]
    struct HangsAfterFirst {
        calls: AtomicUsize,
    }

    impl Transport for HangsAfterFirst {
        async fn deliver(&self, _submission: &Submission) -> DeliveryOutcome {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                DeliveryOutcome::Delivered
            } else {
                std::future::pending().await
            }
        }
    }

    #[tokio::test]
    async fn test_interrupted_drain_keeps_progress() {
        let store = Arc::new(MemoryQueueStore::new());
        let queue = RetryQueue::new(store.clone(), 10, Duration::days(7));
        for name in ["a", "b", "c"] {
            queue.push(submission(name)).unwrap();
        }

        let transport = Arc::new(HangsAfterFirst::default());
        let drainer = {
            let transport = transport.clone();
            tokio::spawn(async move { queue.drain(&transport).await })
        };

        while transport.calls.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        drainer.abort();
        assert!(drainer.await.unwrap_err().is_cancelled());

        assert_eq!(names(&store.load()), vec!["b", "c"]);
    }

    #[test]
    fn test_push_evicts_oldest_first() {
        let queue = RetryQueue::new(MemoryQueueStore::new(), 2, Duration::days(7));

        assert_eq!(queue.push(submission("a")).unwrap(), 0);
        assert_eq!(queue.push(submission("b")).unwrap(), 0);
        assert_eq!(queue.push(submission("c")).unwrap(), 1);

        assert_eq!(names(&queue.entries()), vec!["b", "c"]);
    }

    #[test]
    fn test_expired_entries_are_pruned() {
        let now = Utc::now();
        let store = MemoryQueueStore::with_entries(vec![
            QueuedSubmission {
                submission: submission("old"),
                queued_at: now - Duration::days(8),
            },
            QueuedSubmission {
                submission: submission("fresh"),
                queued_at: now - Duration::hours(1),
            },
        ]);
        let queue = RetryQueue::new(store, 10, Duration::days(7));

        assert_eq!(names(&queue.entries()), vec!["fresh"]);
        queue.push(submission("new")).unwrap();
        assert_eq!(names(&queue.store().load()), vec!["fresh", "new"]);
    }

    #[test]
    fn test_file_store_round_trips_and_tolerates_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileQueueStore::new(dir.path().join("nested"));
        assert!(store.load().is_empty());

        let entries = vec![QueuedSubmission {
            submission: submission("小明"),
            queued_at: Utc::now(),
        }];
        store.save(&entries).unwrap();
        assert!(store.path().ends_with("py_collect_queue_v1.json"));
        assert_eq!(store.load(), entries);

        std::fs::write(store.path(), "not json").unwrap();
        assert!(store.load().is_empty());
    }
}
