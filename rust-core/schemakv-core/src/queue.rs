// SPDX-License-Identifier: PMPL-1.0-or-later
//! Ordered write-behind queue.
//!
//! Every mutation of the store becomes a [`WriteTask`] pushed onto an
//! unbounded channel. A single worker task drains the channel and applies the
//! tasks to the backing [`RowStore`] one at a time, strictly in enqueue
//! order, so the persisted state always converges to the cache state.
//!
//! Enqueueing never blocks or awaits, which keeps the accessor synchronous.
//! [`WriteQueue::flush`] is a barrier: it resolves once every task enqueued
//! before it has been applied.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use schemakv_storage::{PersistedRow, RowStore, StorageResult};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::FailurePolicy;
use crate::error::{StoreError, StoreResult};

/// One unit of persistence work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTask {
    /// Insert or replace one row.
    Upsert(PersistedRow),
    /// Delete the row stored under `key`.
    Delete { key: String },
    /// Remove every row of the table.
    Truncate,
}

impl WriteTask {
    /// Row key the task touches, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            WriteTask::Upsert(row) => Some(&row.key),
            WriteTask::Delete { key } => Some(key),
            WriteTask::Truncate => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            WriteTask::Upsert(_) => "upsert",
            WriteTask::Delete { .. } => "delete",
            WriteTask::Truncate => "truncate",
        }
    }

    async fn apply(&self, store: &dyn RowStore, table: &str) -> StorageResult<()> {
        match self {
            WriteTask::Upsert(row) => store.upsert(table, row).await,
            WriteTask::Delete { key } => store.delete(table, key).await.map(|_| ()),
            WriteTask::Truncate => store.truncate(table).await.map(|_| ()),
        }
    }
}

/// Snapshot of the queue counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueStatus {
    /// Tasks accepted by `enqueue`.
    pub enqueued: u64,
    /// Tasks applied successfully.
    pub completed: u64,
    /// Tasks whose backing-store operation failed (after retries).
    pub failed: u64,
    /// Tasks never attempted because the queue had halted.
    pub dropped: u64,
    pub halted: bool,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl QueueStatus {
    /// Tasks accepted but not yet accounted for.
    pub fn pending(&self) -> u64 {
        self.enqueued
            .saturating_sub(self.completed + self.failed + self.dropped)
    }
}

enum Command {
    Run(WriteTask),
    Flush(oneshot::Sender<StoreResult<()>>),
}

struct Shared {
    halted: AtomicBool,
    status: Mutex<QueueStatus>,
}

impl Shared {
    fn update(&self, f: impl FnOnce(&mut QueueStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }

    fn snapshot(&self) -> QueueStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    fn halt_error(&self) -> StoreError {
        let reason = self
            .snapshot()
            .last_error
            .unwrap_or_else(|| "unknown failure".to_string());
        StoreError::Queue(format!(
            "There was an error during updating the backing store: {reason}"
        ))
    }

    fn outcome(&self) -> StoreResult<()> {
        if self.is_halted() {
            Err(self.halt_error())
        } else {
            Ok(())
        }
    }
}

/// FIFO task runner with exactly one task in flight.
pub struct WriteQueue {
    table: String,
    policy: FailurePolicy,
    sender: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl WriteQueue {
    /// Spawn the worker on the current tokio runtime and start accepting tasks.
    pub fn start(
        store: Arc<dyn RowStore>,
        table: impl Into<String>,
        policy: FailurePolicy,
    ) -> StoreResult<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            StoreError::Queue(format!("write queue needs a tokio runtime: {e}"))
        })?;
        let table = table.into();
        let shared = Arc::new(Shared {
            halted: AtomicBool::new(false),
            status: Mutex::new(QueueStatus::default()),
        });
        let (sender, receiver) = mpsc::unbounded_channel();

        let worker = runtime.spawn(run_worker(
            receiver,
            store,
            table.clone(),
            policy,
            Arc::clone(&shared),
        ));
        debug!(%table, ?policy, "write queue started");

        Ok(Self {
            table,
            policy,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            shared,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Fails if the queue has halted or was shut down.
    pub fn ensure_accepting(&self) -> StoreResult<()> {
        if self.shared.is_halted() {
            return Err(self.shared.halt_error());
        }
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if sender.as_ref().map_or(true, |tx| tx.is_closed()) {
            return Err(StoreError::Queue("write queue is shut down".into()));
        }
        Ok(())
    }

    /// Append a task. Never waits for the task to run.
    pub fn enqueue(&self, task: WriteTask) -> StoreResult<()> {
        if self.shared.is_halted() {
            return Err(self.shared.halt_error());
        }
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = sender
            .as_ref()
            .ok_or_else(|| StoreError::Queue("write queue is shut down".into()))?;
        // Count before sending so the worker never sees a task it cannot account for.
        self.shared.update(|s| s.enqueued += 1);
        tx.send(Command::Run(task)).map_err(|_| {
            self.shared.update(|s| s.enqueued -= 1);
            StoreError::Queue("write queue worker stopped".into())
        })
    }

    /// Wait until every task enqueued so far has been applied.
    ///
    /// Returns the halting failure if the queue has halted.
    pub async fn flush(&self) -> StoreResult<()> {
        let (reply, done) = oneshot::channel();
        {
            let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            let tx = sender
                .as_ref()
                .ok_or_else(|| StoreError::Queue("write queue is shut down".into()))?;
            tx.send(Command::Flush(reply))
                .map_err(|_| StoreError::Queue("write queue worker stopped".into()))?;
        }
        done.await
            .map_err(|_| StoreError::Queue("write queue worker stopped".into()))?
    }

    /// Stop accepting tasks, let the worker drain what is queued and join it.
    pub async fn shutdown(&self) -> StoreResult<()> {
        self.close();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker
                .await
                .map_err(|e| StoreError::Queue(format!("write queue worker panicked: {e}")))?;
        }
        self.shared.outcome()
    }

    /// Stop accepting tasks without waiting; queued tasks still drain.
    pub fn close(&self) {
        let closed = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if closed {
            debug!(table = %self.table, "write queue closed");
        }
    }

    pub fn is_halted(&self) -> bool {
        self.shared.is_halted()
    }

    pub fn status(&self) -> QueueStatus {
        self.shared.snapshot()
    }
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue")
            .field("table", &self.table)
            .field("policy", &self.policy)
            .field("status", &self.shared.snapshot())
            .finish()
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Command>,
    store: Arc<dyn RowStore>,
    table: String,
    policy: FailurePolicy,
    shared: Arc<Shared>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Flush(reply) => {
                // The caller may have stopped waiting; nothing to do then.
                let _ = reply.send(shared.outcome());
            }
            Command::Run(task) if shared.is_halted() => {
                warn!(%table, task = task.kind(), key = ?task.key(), "write queue halted, dropping task");
                shared.update(|s| s.dropped += 1);
            }
            Command::Run(task) => {
                execute(&task, store.as_ref(), &table, policy, &shared).await;
            }
        }
    }
    info!(%table, "write queue drained and stopped");
}

async fn execute(
    task: &WriteTask,
    store: &dyn RowStore,
    table: &str,
    policy: FailurePolicy,
    shared: &Shared,
) {
    let mut attempt = 0;
    loop {
        match task.apply(store, table).await {
            Ok(()) => {
                debug!(%table, task = task.kind(), key = ?task.key(), "write task applied");
                shared.update(|s| s.completed += 1);
                return;
            }
            Err(err) if attempt < policy.retries() => {
                attempt += 1;
                warn!(%table, task = task.kind(), key = ?task.key(), attempt, error = %err, "write task failed, retrying");
                tokio::time::sleep(policy.backoff()).await;
            }
            Err(err) => {
                let message = err.to_string();
                shared.update(|s| {
                    s.failed += 1;
                    s.last_error = Some(message.clone());
                    s.last_error_at = Some(Utc::now());
                });
                if policy == FailurePolicy::Skip {
                    warn!(%table, task = task.kind(), key = ?task.key(), error = %message, "write task failed, skipping");
                } else {
                    error!(%table, task = task.kind(), key = ?task.key(), error = %message, "write task failed, halting write queue");
                    shared.update(|s| s.halted = true);
                    shared.halted.store(true, Ordering::Release);
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use schemakv_storage::{InMemoryRowStore, StorageError};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const TABLE: &str = "data-store";

    /// Records every applied operation and the peak number of concurrent calls.
    #[derive(Default)]
    struct RecordingStore {
        log: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl RecordingStore {
        async fn record(&self, entry: String) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.log.lock().unwrap().push(entry);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RowStore for RecordingStore {
        async fn table_exists(&self, _table: &str) -> StorageResult<bool> {
            Ok(true)
        }
        async fn create_table(&self, _table: &str) -> StorageResult<()> {
            Ok(())
        }
        async fn load_rows(&self, _table: &str) -> StorageResult<Vec<PersistedRow>> {
            Ok(Vec::new())
        }
        async fn upsert(&self, _table: &str, row: &PersistedRow) -> StorageResult<()> {
            self.record(format!("upsert {}={}", row.key, row.value)).await;
            Ok(())
        }
        async fn delete(&self, _table: &str, key: &str) -> StorageResult<bool> {
            self.record(format!("delete {key}")).await;
            Ok(true)
        }
        async fn truncate(&self, _table: &str) -> StorageResult<u64> {
            self.record("truncate".to_string()).await;
            Ok(0)
        }
        fn name(&self) -> &str {
            "recording"
        }
    }

    /// Fails upserts of the key `boom`; the first `transient` upserts of
    /// `flaky` fail as well.
    struct FlakyStore {
        inner: InMemoryRowStore,
        transient: AtomicUsize,
    }

    impl FlakyStore {
        async fn new(transient: usize) -> Self {
            let inner = InMemoryRowStore::new();
            inner.create_table(TABLE).await.unwrap();
            Self {
                inner,
                transient: AtomicUsize::new(transient),
            }
        }
    }

    #[async_trait]
    impl RowStore for FlakyStore {
        async fn table_exists(&self, table: &str) -> StorageResult<bool> {
            self.inner.table_exists(table).await
        }
        async fn create_table(&self, table: &str) -> StorageResult<()> {
            self.inner.create_table(table).await
        }
        async fn load_rows(&self, table: &str) -> StorageResult<Vec<PersistedRow>> {
            self.inner.load_rows(table).await
        }
        async fn upsert(&self, table: &str, row: &PersistedRow) -> StorageResult<()> {
            if row.key == "boom" {
                return Err(StorageError::BackendUnavailable("disk on fire".into()));
            }
            if row.key == "flaky"
                && self
                    .transient
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(StorageError::BackendUnavailable("try again".into()));
            }
            self.inner.upsert(table, row).await
        }
        async fn delete(&self, table: &str, key: &str) -> StorageResult<bool> {
            self.inner.delete(table, key).await
        }
        async fn truncate(&self, table: &str) -> StorageResult<u64> {
            self.inner.truncate(table).await
        }
        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn upsert(key: &str, value: &str) -> WriteTask {
        WriteTask::Upsert(PersistedRow::new(key, value))
    }

    #[tokio::test]
    async fn test_tasks_run_in_order_one_at_a_time() {
        let store = Arc::new(RecordingStore::default());
        let queue = WriteQueue::start(store.clone(), TABLE, FailurePolicy::Halt).unwrap();

        queue.enqueue(upsert("a", "1")).unwrap();
        queue.enqueue(upsert("b", "2")).unwrap();
        queue.enqueue(WriteTask::Delete { key: "a".into() }).unwrap();
        queue.enqueue(WriteTask::Truncate).unwrap();
        queue.enqueue(upsert("a", "3")).unwrap();
        queue.flush().await.unwrap();

        assert_eq!(
            store.log(),
            vec!["upsert a=1", "upsert b=2", "delete a", "truncate", "upsert a=3"]
        );
        assert_eq!(store.peak.load(Ordering::SeqCst), 1);

        let status = queue.status();
        assert_eq!(status.enqueued, 5);
        assert_eq!(status.completed, 5);
        assert_eq!(status.pending(), 0);
    }

    #[tokio::test]
    async fn test_flush_on_empty_queue() {
        let queue = WriteQueue::start(
            Arc::new(RecordingStore::default()),
            TABLE,
            FailurePolicy::Halt,
        )
        .unwrap();
        queue.flush().await.unwrap();
        assert_eq!(queue.status(), QueueStatus::default());
    }

    #[test]
    fn test_start_requires_runtime() {
        let err = WriteQueue::start(
            Arc::new(RecordingStore::default()),
            TABLE,
            FailurePolicy::Halt,
        )
        .unwrap_err();
        assert_eq!(err.code(), "QUEUE_ERR");
    }

    #[tokio::test]
    async fn test_halt_policy_stops_queue() {
        let store = Arc::new(FlakyStore::new(0).await);
        let queue = WriteQueue::start(store.clone(), TABLE, FailurePolicy::Halt).unwrap();

        queue.enqueue(upsert("ok", "1")).unwrap();
        queue.enqueue(upsert("boom", "2")).unwrap();
        queue.enqueue(upsert("after", "3")).unwrap();

        let err = queue.flush().await.unwrap_err();
        assert!(err.to_string().contains("disk on fire"));
        assert!(queue.is_halted());

        // Later writes are rejected up front.
        assert!(queue.ensure_accepting().is_err());
        assert!(queue.enqueue(upsert("later", "4")).is_err());

        let status = queue.status();
        assert_eq!(status.completed, 1);
        assert_eq!(status.failed, 1);
        assert_eq!(status.dropped, 1);
        assert!(status.halted);
        assert!(status.last_error_at.is_some());

        assert_eq!(store.inner.value_of(TABLE, "ok").await.as_deref(), Some("1"));
        assert_eq!(store.inner.value_of(TABLE, "after").await, None);
    }

    #[tokio::test]
    async fn test_skip_policy_continues() {
        let store = Arc::new(FlakyStore::new(0).await);
        let queue = WriteQueue::start(store.clone(), TABLE, FailurePolicy::Skip).unwrap();

        queue.enqueue(upsert("boom", "1")).unwrap();
        queue.enqueue(upsert("after", "2")).unwrap();
        queue.flush().await.unwrap();

        let status = queue.status();
        assert_eq!(status.failed, 1);
        assert_eq!(status.completed, 1);
        assert!(!status.halted);
        assert!(status.last_error.unwrap().contains("disk on fire"));
        assert_eq!(store.inner.value_of(TABLE, "after").await.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_retry_policy_recovers_from_transient_failures() {
        let store = Arc::new(FlakyStore::new(2).await);
        let policy = FailurePolicy::Retry {
            attempts: 3,
            backoff_ms: 1,
        };
        let queue = WriteQueue::start(store.clone(), TABLE, policy).unwrap();

        queue.enqueue(upsert("flaky", "v")).unwrap();
        queue.flush().await.unwrap();

        assert_eq!(queue.status().completed, 1);
        assert_eq!(queue.status().failed, 0);
        assert_eq!(store.inner.value_of(TABLE, "flaky").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_retry_policy_halts_when_exhausted() {
        let store = Arc::new(FlakyStore::new(0).await);
        let policy = FailurePolicy::Retry {
            attempts: 2,
            backoff_ms: 1,
        };
        let queue = WriteQueue::start(store, TABLE, policy).unwrap();

        queue.enqueue(upsert("boom", "v")).unwrap();
        assert!(queue.flush().await.is_err());
        assert!(queue.is_halted());
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_tasks() {
        let store = Arc::new(RecordingStore::default());
        let queue = WriteQueue::start(store.clone(), TABLE, FailurePolicy::Halt).unwrap();

        for i in 0..10 {
            queue.enqueue(upsert("k", &i.to_string())).unwrap();
        }
        queue.shutdown().await.unwrap();

        assert_eq!(store.log().len(), 10);
        assert_eq!(store.log().last().map(String::as_str), Some("upsert k=9"));
        assert!(queue.enqueue(upsert("k", "late")).is_err());
        assert!(queue.flush().await.is_err());
        assert!(queue.ensure_accepting().is_err());
    }

    #[test]
    fn test_task_keys() {
        assert_eq!(upsert("a", "1").key(), Some("a"));
        assert_eq!(WriteTask::Delete { key: "b".into() }.key(), Some("b"));
        assert_eq!(WriteTask::Truncate.key(), None);
    }
}
