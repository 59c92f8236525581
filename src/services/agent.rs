// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client-side submission agent.
//!
//! Tracks one play session (timer, moves, video flag, student identity),
//! builds the final submission and makes sure it eventually reaches the
//! collect endpoint:
//! - one immediate delivery attempt
//! - transient failures are persisted to the retry queue
//! - the queue is drained shortly after `configure` and whenever
//!   connectivity comes back

use crate::config::AgentConfig;
use crate::models::Submission;
use crate::services::delivery::{DeliveryOutcome, Transport};
use crate::services::queue::{DrainReport, QueueStore, RetryQueue};
use crate::time_utils::{now_rfc3339, rounded_secs};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;

const DEFAULT_GAME: &str = "腾冲皮影戏 · 非遗探秘闯关";
const DEFAULT_VERSION: &str = "1.0.0";

/// Callback shown to the player when identity fields are missing.
pub type IdentityNotice = Box<dyn Fn(&[&'static str]) + Send + Sync>;

/// Transport plus queue, shared with the background drain task.
struct Courier<T, S> {
    transport: T,
    queue: Mutex<RetryQueue<S>>,
}

impl<T: Transport, S: QueueStore> Courier<T, S> {
    async fn drain(&self) -> DrainReport {
        let queue = self.queue.lock().await;
        queue.drain(&self.transport).await
    }
}

#[derive(Debug, Default)]
struct Identity {
    name: String,
    grade: String,
    class_name: String,
}

#[derive(Debug, Default)]
struct SessionState {
    started_at: Option<Instant>,
    elapsed_secs: u64,
    total_moves: u64,
    level3_moves: u64,
    video_seen: bool,
    last_move_at: Option<Instant>,
}

/// Accumulates one session's telemetry and delivers it.
pub struct SubmissionAgent<T, S> {
    courier: Arc<Courier<T, S>>,
    config: AgentConfig,
    meta: Map<String, Value>,
    identity: Identity,
    state: SessionState,
    identity_notice: Option<IdentityNotice>,
    drain_task: Option<AbortHandle>,
}

impl<T, S> SubmissionAgent<T, S>
where
    T: Transport + 'static,
    S: QueueStore + 'static,
{
    pub fn new(config: AgentConfig, transport: T, store: S) -> Self {
        let queue = RetryQueue::new(store, config.max_queue_len, config.max_queue_age);

        let mut meta = Map::new();
        meta.insert("game".to_string(), Value::from(DEFAULT_GAME));
        meta.insert("version".to_string(), Value::from(DEFAULT_VERSION));
        meta.insert("timestamp".to_string(), Value::from(now_rfc3339()));

        Self {
            courier: Arc::new(Courier {
                transport,
                queue: Mutex::new(queue),
            }),
            config,
            meta,
            identity: Identity::default(),
            state: SessionState::default(),
            identity_notice: None,
            drain_task: None,
        }
    }

    /// Register the notice shown when a submission lacks identity fields.
    pub fn on_identity_missing(
        mut self,
        notice: impl Fn(&[&'static str]) + Send + Sync + 'static,
    ) -> Self {
        self.identity_notice = Some(Box::new(notice));
        self
    }

    /// Merge session metadata and start the background queue drainer.
    ///
    /// The drainer runs once after the configured initial delay and again
    /// every time `connectivity` flips from offline (`false`) to online
    /// (`true`). It stops when the sender is dropped. Reconfiguring replaces
    /// the previous drainer.
    pub fn configure(
        &mut self,
        metadata_defaults: Map<String, Value>,
        connectivity: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        self.meta.extend(metadata_defaults);
        self.meta
            .insert("timestamp".to_string(), Value::from(now_rfc3339()));

        if let Some(previous) = self.drain_task.take() {
            previous.abort();
        }

        let handle = spawn_drainer(
            self.courier.clone(),
            self.config.initial_drain_delay,
            connectivity,
        );
        self.drain_task = Some(handle.abort_handle());
        handle
    }

    /// Store the student's identity (trimmed, otherwise unvalidated).
    pub fn set_identity(&mut self, name: &str, grade: &str, class_name: &str) {
        self.identity = Identity {
            name: name.trim().to_string(),
            grade: grade.trim().to_string(),
            class_name: class_name.trim().to_string(),
        };
    }

    pub fn start_timer(&mut self) {
        self.state.started_at = Some(Instant::now());
    }

    /// Stop the timer and return elapsed whole seconds.
    ///
    /// Without a running timer this returns the last measured value.
    pub fn stop_timer(&mut self) -> u64 {
        if let Some(started_at) = self.state.started_at.take() {
            self.state.elapsed_secs = rounded_secs(started_at.elapsed());
        }
        self.state.elapsed_secs
    }

    /// Count one move, ignoring bursts inside the throttle window.
    ///
    /// Returns whether the move was counted.
    pub fn record_move(&mut self) -> bool {
        let now = Instant::now();
        if let Some(last) = self.state.last_move_at {
            if now.duration_since(last) <= self.config.move_throttle {
                return false;
            }
        }

        self.state.last_move_at = Some(now);
        self.state.total_moves += 1;
        true
    }

    /// Set the level-3 move count; non-finite input is ignored.
    pub fn set_level3_moves(&mut self, moves: f64) {
        if moves.is_finite() {
            self.state.level3_moves = moves.round().max(0.0) as u64;
        }
    }

    pub fn mark_video_seen(&mut self, seen: bool) {
        self.state.video_seen = seen;
    }

    pub fn total_moves(&self) -> u64 {
        self.state.total_moves
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.state.elapsed_secs
    }

    /// Number of submissions waiting in the retry queue.
    pub async fn pending(&self) -> usize {
        self.courier.queue.lock().await.len()
    }

    /// Retry every queued submission now.
    pub async fn drain_queue(&self) -> DrainReport {
        self.courier.drain().await
    }

    /// Build and deliver the final submission.
    ///
    /// Returns `true` only when the endpoint confirmed the write. Missing
    /// identity fails fast without touching the network. Transient failures
    /// are queued for retry; permanent rejections are not.
    pub async fn submit_final(&mut self, extra_metadata: Map<String, Value>) -> bool {
        if self.state.started_at.is_some() {
            self.stop_timer();
        }

        let submission = self.build_submission(extra_metadata);

        let missing = submission.missing_identity();
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "Submission blocked: identity incomplete");
            if let Some(notice) = &self.identity_notice {
                notice(&missing);
            }
            return false;
        }

        match self.courier.transport.deliver(&submission).await {
            DeliveryOutcome::Delivered => {
                tracing::info!("Submission delivered");
                true
            }
            DeliveryOutcome::Rejected { reason } => {
                tracing::warn!(reason = %reason, "Submission rejected by endpoint, not queued");
                false
            }
            DeliveryOutcome::Failed { reason } => {
                tracing::info!(reason = %reason, "Submission not delivered, queued for retry");
                let queue = self.courier.queue.lock().await;
                if let Err(e) = queue.push(submission) {
                    tracing::error!(error = %e, "Failed to persist submission to retry queue");
                }
                false
            }
        }
    }

    fn build_submission(&self, extra_metadata: Map<String, Value>) -> Submission {
        let mut meta = self.meta.clone();
        meta.extend(extra_metadata);

        // A level-3 count of zero means none was recorded.
        let l3_moves = if self.state.level3_moves > 0 {
            self.state.level3_moves
        } else {
            self.state.total_moves
        };

        Submission {
            name: self.identity.name.clone(),
            grade: self.identity.grade.clone(),
            class_name: self.identity.class_name.clone(),
            l3_moves,
            v_seen: self.state.video_seen,
            time_sec: Some(self.state.elapsed_secs),
            timestamp: Some(now_rfc3339()),
            meta,
        }
    }
}

impl<T, S> Drop for SubmissionAgent<T, S> {
    fn drop(&mut self) {
        if let Some(task) = self.drain_task.take() {
            task.abort();
        }
    }
}

fn spawn_drainer<T, S>(
    courier: Arc<Courier<T, S>>,
    initial_delay: Duration,
    mut connectivity: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    T: Transport + 'static,
    S: QueueStore + 'static,
{
    tokio::spawn(async move {
        let mut online = *connectivity.borrow_and_update();

        tokio::time::sleep(initial_delay).await;
        courier.drain().await;

        while connectivity.changed().await.is_ok() {
            let now_online = *connectivity.borrow_and_update();
            if now_online && !online {
                tracing::info!("Connectivity restored, draining retry queue");
                courier.drain().await;
            }
            online = now_online;
        }
    })
}
