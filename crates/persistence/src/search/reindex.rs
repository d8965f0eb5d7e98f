//! Index synchronization.
//!
//! [`IndexSynchronizer`] turns committed change events into index writes:
//! events resolve to per-question directives, every targeted question is
//! re-read from the store and projected, and the resulting action is written
//! with bounded retries.
//!
//! Index failures never propagate to the mutation that caused them, and never
//! hold it up for longer than [`IndexingConfig::inline_wait`]: reindexing runs
//! on its own task, and whatever outlives the caller's wait (retries against a
//! slow or failing index) finishes in the background. A write that still
//! fails after its retries is logged and the question is recorded as degraded
//! in [`IndexSyncStatus`] until a later write for it succeeds.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{IndexSyncMode, IndexingConfig};
use crate::core::{ChangeEvent, QuestionStorage};
use crate::error::{IndexError, StorageResult};
use crate::types::QuestionId;

use super::dependency::{DependencyTracker, ReindexDirective};
use super::projector::{IndexAction, IndexProjector};
use super::writer::SearchIndexWriter;

/// The kind of index call a reindex issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOp {
    /// Document written.
    Upsert,
    /// Document removed.
    Delete,
}

/// The result of reindexing one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexOutcome {
    /// Question reindexed.
    pub question_id: QuestionId,
    /// Directive that triggered the reindex.
    pub directive: ReindexDirective,
    /// Index call issued, if the question could be projected.
    pub op: Option<IndexOp>,
    /// Number of index calls made, retries included.
    pub attempts: u32,
    /// Final error, if the reindex failed.
    pub error: Option<String>,
}

impl ReindexOutcome {
    fn failed(
        question_id: QuestionId,
        directive: ReindexDirective,
        error: impl ToString,
    ) -> Self {
        Self {
            question_id,
            directive,
            op: None,
            attempts: 0,
            error: Some(error.to_string()),
        }
    }

    /// Returns true when the index reflects the question's committed state.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Health of the search index as seen by the synchronizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSyncStatus {
    /// Successful upserts.
    pub upserts: u64,
    /// Successful deletes.
    pub deletes: u64,
    /// Retried index calls.
    pub retries: u64,
    /// Reindexes that failed after all retries.
    pub failures: u64,
    /// Most recent failure message.
    pub last_error: Option<String>,
    /// When an index write last succeeded.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Questions whose document may be stale.
    pub degraded: BTreeSet<QuestionId>,
}

impl IndexSyncStatus {
    /// Returns true when no question is known to be stale.
    pub fn is_healthy(&self) -> bool {
        self.degraded.is_empty()
    }
}

/// Progress of a full reindex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexProgress {
    /// Questions found in the store.
    pub total: u64,
    /// Questions handled so far.
    pub processed: u64,
    /// Documents written.
    pub upserted: u64,
    /// Documents removed.
    pub deleted: u64,
    /// Questions whose reindex failed.
    pub failed: Vec<QuestionId>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run completed.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReindexProgress {
    fn new(total: u64) -> Self {
        Self {
            total,
            processed: 0,
            upserted: 0,
            deleted: 0,
            failed: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    fn record(&mut self, outcome: &ReindexOutcome) {
        self.processed += 1;
        match (outcome.is_success(), outcome.op) {
            (true, Some(IndexOp::Upsert)) => self.upserted += 1,
            (true, Some(IndexOp::Delete)) => self.deleted += 1,
            _ => self.failed.push(outcome.question_id),
        }
    }

    /// Percentage of questions processed.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.processed as f64 / self.total as f64) * 100.0
    }

    /// Returns true if any question failed.
    pub fn has_errors(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Keeps the search index in step with committed changes.
pub struct IndexSynchronizer {
    store: Arc<dyn QuestionStorage>,
    writer: Arc<dyn SearchIndexWriter>,
    projector: IndexProjector,
    tracker: DependencyTracker,
    config: IndexingConfig,
    locks: Mutex<HashMap<QuestionId, Arc<AsyncMutex<()>>>>,
    status: RwLock<IndexSyncStatus>,
    sender: Mutex<Option<mpsc::Sender<Vec<ChangeEvent>>>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for IndexSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSynchronizer")
            .field("store", &self.store.backend_name())
            .field("index", &self.writer.index_name())
            .field("config", &self.config)
            .finish()
    }
}

impl IndexSynchronizer {
    /// Creates a synchronizer with the default dependency rules.
    pub fn new(
        store: Arc<dyn QuestionStorage>,
        writer: Arc<dyn SearchIndexWriter>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            store,
            writer,
            projector: IndexProjector::new(),
            tracker: DependencyTracker::new(),
            config,
            locks: Mutex::new(HashMap::new()),
            status: RwLock::new(IndexSyncStatus::default()),
            sender: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the dependency tracker.
    pub fn with_tracker(mut self, tracker: DependencyTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Returns the indexing configuration.
    pub fn config(&self) -> &IndexingConfig {
        &self.config
    }

    /// Returns a snapshot of the index status.
    pub fn status(&self) -> IndexSyncStatus {
        self.status.read().clone()
    }

    /// Returns true when no question is known to be stale.
    pub fn is_healthy(&self) -> bool {
        self.status.read().is_healthy()
    }

    /// Hands committed events to the index.
    ///
    /// In inline mode the events are reindexed on a spawned task and this
    /// waits for it at most [`IndexingConfig::inline_wait`], returning the
    /// outcomes if it finished in time and an empty list otherwise. In
    /// background mode the events are queued for the worker and an empty
    /// list is returned; without a running worker, or with a full queue, it
    /// falls back to inline. Never fails.
    pub async fn submit(self: &Arc<Self>, events: Vec<ChangeEvent>) -> Vec<ReindexOutcome> {
        if events.is_empty() {
            return Vec::new();
        }

        if self.config.mode == IndexSyncMode::Background {
            let sender = self.sender.lock().clone();
            match sender {
                Some(sender) => match sender.try_send(events) {
                    Ok(()) => return Vec::new(),
                    Err(mpsc::error::TrySendError::Full(events)) => {
                        warn!("Index queue is full, reindexing inline");
                        return self.run_inline(events).await;
                    }
                    Err(mpsc::error::TrySendError::Closed(events)) => {
                        warn!("Index worker is gone, reindexing inline");
                        return self.run_inline(events).await;
                    }
                },
                None => warn!("No index worker running, reindexing inline"),
            }
        }

        self.run_inline(events).await
    }

    async fn run_inline(self: &Arc<Self>, events: Vec<ChangeEvent>) -> Vec<ReindexOutcome> {
        let (report, outcomes) = oneshot::channel();
        let synchronizer = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcomes = synchronizer.dispatch_logged(&events).await;
            // The caller may have stopped waiting.
            let _ = report.send(outcomes);
        });

        match tokio::time::timeout(self.config.inline_wait, outcomes).await {
            Ok(Ok(outcomes)) => outcomes,
            Ok(Err(_)) => {
                warn!("Reindex task ended without reporting");
                Vec::new()
            }
            Err(_) => {
                debug!(
                    wait_ms = self.config.inline_wait.as_millis() as u64,
                    "Index writes still running, continuing in background"
                );
                self.track(task);
                Vec::new()
            }
        }
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut pending = self.pending.lock();
        pending.retain(|t| !t.is_finished());
        pending.push(task);
    }

    /// Waits for reindexing that outlived its caller's inline wait.
    pub async fn flush(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.pending.lock());
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "Reindex task failed");
                }
            }
        }
    }

    /// Resolves events to directives and reindexes every targeted question.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store cannot answer a reverse lookup.
    /// Index write failures are reported in the outcomes.
    pub async fn dispatch(&self, events: &[ChangeEvent]) -> StorageResult<Vec<ReindexOutcome>> {
        let directives = self.tracker.coalesce(events, self.store.as_ref()).await?;
        debug!(
            events = events.len(),
            questions = directives.len(),
            "Resolved reindex directives"
        );

        let mut outcomes = Vec::with_capacity(directives.len());
        for (id, directive) in directives {
            outcomes.push(self.reindex_question(id, directive).await);
        }
        Ok(outcomes)
    }

    async fn dispatch_logged(&self, events: &[ChangeEvent]) -> Vec<ReindexOutcome> {
        match self.dispatch(events).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!(error = %e, "Failed to resolve reindex targets");
                let mut status = self.status.write();
                status.failures += 1;
                status.last_error = Some(e.to_string());
                Vec::new()
            }
        }
    }

    /// Reindexes one question from its latest committed state.
    ///
    /// Writes for the same question are serialized, and each one re-reads
    /// the store after taking the lock, so the last write always reflects
    /// the last commit. A question missing from the store is deleted from
    /// the index.
    pub async fn reindex_question(
        &self,
        id: QuestionId,
        directive: ReindexDirective,
    ) -> ReindexOutcome {
        let lock = self.lock_for(id);
        let outcome = {
            let _guard = lock.lock().await;
            self.reindex_locked(id, directive).await
        };
        drop(lock);
        self.release_lock(id);

        self.record(&outcome);
        outcome
    }

    async fn reindex_locked(&self, id: QuestionId, directive: ReindexDirective) -> ReindexOutcome {
        let action = match self.store.read(id).await {
            Ok(Some(question)) => match self.projector.project(&question) {
                Ok(action) => action,
                Err(e) => return ReindexOutcome::failed(id, directive, e),
            },
            Ok(None) => IndexAction::Delete { id },
            Err(e) => return ReindexOutcome::failed(id, directive, e),
        };

        let op = if action.is_delete() {
            IndexOp::Delete
        } else {
            IndexOp::Upsert
        };
        debug!(question_id = %id, %directive, ?op, "Reindexing question");

        let (attempts, result) = self.write_with_retry(&action).await;
        ReindexOutcome {
            question_id: id,
            directive,
            op: Some(op),
            attempts,
            error: result.err().map(|e| e.to_string()),
        }
    }

    async fn write_with_retry(&self, action: &IndexAction) -> (u32, Result<(), IndexError>) {
        let retry = &self.config.retry;
        let timeout = self.config.write_timeout;
        let mut delay = retry.initial_delay;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result = match tokio::time::timeout(timeout, action.apply(self.writer.as_ref()))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(IndexError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(()) => return (attempts, Ok(())),
                Err(e) if e.is_transient() && attempts <= retry.max_retries => {
                    warn!(
                        question_id = %action.question_id(),
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Index write failed, retrying"
                    );
                    self.status.write().retries += 1;
                    tokio::time::sleep(delay).await;
                    delay = retry.next_delay(delay);
                }
                Err(e) => return (attempts, Err(e)),
            }
        }
    }

    fn record(&self, outcome: &ReindexOutcome) {
        let mut status = self.status.write();
        match (&outcome.error, outcome.op) {
            (None, Some(op)) => {
                match op {
                    IndexOp::Upsert => status.upserts += 1,
                    IndexOp::Delete => status.deletes += 1,
                }
                status.last_success_at = Some(Utc::now());
                status.degraded.remove(&outcome.question_id);
            }
            (error, _) => {
                let message = error.clone().unwrap_or_default();
                warn!(
                    question_id = %outcome.question_id,
                    attempts = outcome.attempts,
                    error = %message,
                    "Search index degraded, document may be stale"
                );
                status.failures += 1;
                status.last_error = Some(message);
                status.degraded.insert(outcome.question_id);
            }
        }
    }

    fn lock_for(&self, id: QuestionId) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(id).or_default().clone()
    }

    fn release_lock(&self, id: QuestionId) {
        let mut locks = self.locks.lock();
        if locks.get(&id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&id);
        }
    }

    /// Rebuilds the document of every stored question.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot list its questions. Per-question
    /// failures are collected in the progress.
    pub async fn reindex_all(&self) -> StorageResult<ReindexProgress> {
        let ids = self.store.list_ids().await?;
        let mut progress = ReindexProgress::new(ids.len() as u64);
        info!(total = progress.total, "Starting full reindex");

        for id in ids {
            let outcome = self.reindex_question(id, ReindexDirective::Full).await;
            progress.record(&outcome);
        }

        progress.completed_at = Some(Utc::now());
        info!(
            total = progress.total,
            upserted = progress.upserted,
            deleted = progress.deleted,
            failed = progress.failed.len(),
            "Full reindex completed"
        );
        Ok(progress)
    }

    /// Starts the background worker.
    ///
    /// Batches are processed one at a time in submission order. The worker
    /// exits once [`stop_worker`](Self::stop_worker) is called and the queue
    /// has drained.
    pub fn start_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let (sender, mut receiver) =
            mpsc::channel::<Vec<ChangeEvent>>(self.config.queue_capacity.max(1));
        *self.sender.lock() = Some(sender);

        let synchronizer = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(events) = receiver.recv().await {
                synchronizer.dispatch_logged(&events).await;
            }
            debug!("Index worker stopped");
        })
    }

    /// Stops accepting background work.
    pub fn stop_worker(&self) {
        self.sender.lock().take();
    }
}
