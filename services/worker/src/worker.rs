//! The archive worker loop: poll, process, acknowledge or dead-letter.
//!
//! Each received message gets a single processing attempt; redelivery of
//! unacknowledged messages is left to the queue's visibility timeout and
//! redrive policy. No error terminates the loop.

use crate::config::WorkerConfig;
use crate::envelope::{Envelope, QueueMessage};
use crate::health::{now_rfc3339, StatusWriter, WorkerStatus};
use crate::queue::{Queue, QueueError};
use crate::storage::Uploader;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Classification of a failed processing attempt, used as the dead-letter
/// reason prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    /// Message body did not parse as an envelope
    InvalidFormat,
    /// The archive write failed
    Upload,
    /// Anything else that broke the attempt
    Processing,
}

impl FailureKind {
    fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidFormat => "invalid format",
            FailureKind::Upload => "upload error",
            FailureKind::Processing => "processing error",
        }
    }
}

/// A failed processing attempt with its dead-letter reason
#[derive(Debug)]
struct ProcessFailure {
    kind: FailureKind,
    detail: String,
}

impl ProcessFailure {
    fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    fn reason(&self) -> String {
        format!("{}: {}", self.kind.as_str(), self.detail)
    }
}

/// Result of one successful processing attempt
enum ProcessOutcome {
    /// Archived and removed from the queue
    Archived { message_id: String },
    /// Archived, but the acknowledgment failed; the queue will redeliver and
    /// a later attempt produces a harmless duplicate object
    ArchivedUnacked { message_id: String },
}

/// The queue-to-archive worker.
///
/// Single-writer: all counters are mutated only by the loop itself, so the
/// status snapshot never observes a torn update.
pub struct ArchiveWorker {
    queue: Arc<dyn Queue>,
    uploader: Uploader,
    status_writer: StatusWriter,
    config: WorkerConfig,
    started_at: DateTime<Utc>,
    messages_processed: u64,
    messages_failed: u64,
    last_processed_id: Option<String>,
}

impl ArchiveWorker {
    /// Create a new worker over the given queue and uploader
    pub fn new(
        queue: Arc<dyn Queue>,
        uploader: Uploader,
        status_writer: StatusWriter,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            uploader,
            status_writer,
            config,
            started_at: Utc::now(),
            messages_processed: 0,
            messages_failed: 0,
            last_processed_id: None,
        }
    }

    /// Run until the shutdown token is cancelled.
    ///
    /// Shutdown is cooperative: a cancellation is observed at the next cycle
    /// boundary, so an in-flight upload or acknowledge is never interrupted.
    /// One final status snapshot is written before returning.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            poll_interval_seconds = self.config.poll_interval_seconds,
            max_messages_per_poll = self.config.max_messages_per_poll,
            "Archive worker starting"
        );

        let status_interval = std::time::Duration::from_secs(self.config.status_interval_seconds);
        let poll_interval = std::time::Duration::from_secs(self.config.poll_interval_seconds);
        let mut last_snapshot = Instant::now();

        while !shutdown.is_cancelled() {
            self.run_cycle().await;

            if last_snapshot.elapsed() >= status_interval {
                self.write_status("running").await;
                last_snapshot = Instant::now();
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        self.write_status("stopped").await;

        info!(
            messages_processed = self.messages_processed,
            messages_failed = self.messages_failed,
            "Archive worker stopped"
        );
    }

    /// One poll/process cycle: fetch a batch and process it sequentially
    pub async fn run_cycle(&mut self) {
        debug!("Polling queue for messages");
        let messages = self.queue.receive(self.config.max_messages_per_poll).await;

        if messages.is_empty() {
            debug!("No messages available");
            return;
        }

        info!(count = messages.len(), "Received message batch");
        for message in &messages {
            self.process_message(message).await;
        }
    }

    /// Current counters as a status snapshot
    pub fn status_snapshot(&self, status: &str) -> WorkerStatus {
        WorkerStatus {
            timestamp: now_rfc3339(),
            status: status.to_string(),
            messages_processed: self.messages_processed,
            messages_failed: self.messages_failed,
            last_processed_id: self.last_processed_id.clone(),
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
        }
    }

    /// Process a single message and settle it with the queue
    #[instrument(skip(self, message), fields(queue_message_id = ?message.queue_message_id))]
    async fn process_message(&mut self, message: &QueueMessage) {
        match self.try_process(message).await {
            Ok(ProcessOutcome::Archived { message_id }) => {
                self.messages_processed += 1;
                self.last_processed_id = Some(message_id.clone());
                metrics::counter!("archiver.messages.processed").increment(1);
                info!(message_id = %message_id, "Message processed successfully");
            }
            Ok(ProcessOutcome::ArchivedUnacked { message_id }) => {
                // Data is safely archived; the unacknowledged message will be
                // redelivered after the visibility timeout.
                warn!(
                    message_id = %message_id,
                    "Message archived but failed to acknowledge"
                );
            }
            Err(failure) => {
                self.messages_failed += 1;
                metrics::counter!("archiver.messages.failed").increment(1);
                let reason = failure.reason();
                error!(reason = %reason, "Failed to process message");
                self.queue.dead_letter(message, &reason).await;
            }
        }
    }

    /// Parse, upload, acknowledge: a single attempt with no in-process retry
    async fn try_process(&self, message: &QueueMessage) -> Result<ProcessOutcome, ProcessFailure> {
        let envelope: Envelope = serde_json::from_str(&message.body)
            .map_err(|e| ProcessFailure::new(FailureKind::InvalidFormat, e.to_string()))?;

        let message_id = envelope.message_id.clone();
        debug!(message_id = %message_id, "Uploading envelope to archive");

        let start = Instant::now();
        self.uploader
            .upload(&envelope)
            .await
            .map_err(|e| ProcessFailure::new(FailureKind::Upload, e.to_string()))?;
        metrics::histogram!("archiver.upload.duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match self.queue.acknowledge(message).await {
            Ok(()) => Ok(ProcessOutcome::Archived { message_id }),
            Err(QueueError::MissingReceiptHandle) => Err(ProcessFailure::new(
                FailureKind::Processing,
                "message has no receipt handle",
            )),
            Err(_) => Ok(ProcessOutcome::ArchivedUnacked { message_id }),
        }
    }

    /// Write a status snapshot; a failed write is logged, never fatal
    async fn write_status(&self, status: &str) {
        let snapshot = self.status_snapshot(status);
        if let Err(e) = self.status_writer.write(&snapshot).await {
            error!(error = %e, "Failed to write status snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalObjectStore, ObjectStore, StorageError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted queue: hands out seeded messages and records settlements
    struct FakeQueue {
        pending: Mutex<VecDeque<QueueMessage>>,
        acknowledged: Mutex<Vec<String>>,
        dead_lettered: Mutex<Vec<(String, String)>>,
        fail_acknowledge: bool,
    }

    impl FakeQueue {
        fn new(messages: Vec<QueueMessage>) -> Self {
            Self {
                pending: Mutex::new(messages.into()),
                acknowledged: Mutex::new(Vec::new()),
                dead_lettered: Mutex::new(Vec::new()),
                fail_acknowledge: false,
            }
        }

        fn failing_acks(messages: Vec<QueueMessage>) -> Self {
            Self {
                fail_acknowledge: true,
                ..Self::new(messages)
            }
        }
    }

    #[async_trait]
    impl Queue for FakeQueue {
        async fn receive(&self, max_messages: usize) -> Vec<QueueMessage> {
            let mut pending = self.pending.lock().unwrap();
            let count = max_messages.min(pending.len());
            pending.drain(..count).collect()
        }

        async fn acknowledge(&self, message: &QueueMessage) -> Result<(), QueueError> {
            if message.receipt_handle.is_empty() {
                return Err(QueueError::MissingReceiptHandle);
            }
            if self.fail_acknowledge {
                return Err(QueueError::Acknowledge("simulated outage".to_string()));
            }
            self.acknowledged
                .lock()
                .unwrap()
                .push(message.receipt_handle.clone());
            Ok(())
        }

        async fn dead_letter(&self, message: &QueueMessage, reason: &str) {
            self.dead_lettered
                .lock()
                .unwrap()
                .push((message.body.clone(), reason.to_string()));
        }
    }

    /// Store whose every write fails, simulating an unreachable backend
    struct FailingStore;

    #[async_trait]
    impl ObjectStore for FailingStore {
        async fn put(
            &self,
            _key: &str,
            _body: Vec<u8>,
            _content_type: &str,
        ) -> Result<(), StorageError> {
            Err(StorageError::Backend("storage unreachable".to_string()))
        }
    }

    /// Store that records keys without persisting anything
    struct RecordingStore {
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn put(
            &self,
            key: &str,
            _body: Vec<u8>,
            _content_type: &str,
        ) -> Result<(), StorageError> {
            self.keys.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    fn message(id: &str, handle: &str) -> QueueMessage {
        let body = serde_json::json!({
            "message_id": id,
            "timestamp": "2024-01-15T10:30:00Z",
            "data": {"subject": "s", "sender": "a@example.com", "event_time": "1705314600", "body": "b"}
        });
        QueueMessage {
            queue_message_id: Some(format!("sqs-{handle}")),
            body: body.to_string(),
            receipt_handle: handle.to_string(),
            attributes: HashMap::new(),
        }
    }

    fn malformed_message() -> QueueMessage {
        QueueMessage {
            queue_message_id: Some("sqs-bad".to_string()),
            body: "this is not json".to_string(),
            receipt_handle: "handle-bad".to_string(),
            attributes: HashMap::new(),
        }
    }

    fn worker_with(queue: Arc<FakeQueue>, store: Arc<dyn ObjectStore>, dir: &std::path::Path) -> ArchiveWorker {
        ArchiveWorker::new(
            queue,
            Uploader::new(store, "emails"),
            StatusWriter::new(dir),
            WorkerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_two_messages_processed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(FakeQueue::new(vec![
            message("msg_aaaaaaaaaaaaaaaa", "h1"),
            message("msg_bbbbbbbbbbbbbbbb", "h2"),
        ]));
        let store = Arc::new(RecordingStore {
            keys: Mutex::new(Vec::new()),
        });
        let mut worker = worker_with(queue.clone(), store.clone(), dir.path());

        worker.run_cycle().await;

        let status = worker.status_snapshot("running");
        assert_eq!(status.messages_processed, 2);
        assert_eq!(status.messages_failed, 0);
        assert_eq!(
            status.last_processed_id.as_deref(),
            Some("msg_bbbbbbbbbbbbbbbb")
        );
        assert_eq!(queue.acknowledged.lock().unwrap().as_slice(), ["h1", "h2"]);
        assert!(queue.dead_lettered.lock().unwrap().is_empty());
        assert_eq!(store.keys.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_body_is_dead_lettered_without_upload() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(FakeQueue::new(vec![malformed_message()]));
        let store = Arc::new(RecordingStore {
            keys: Mutex::new(Vec::new()),
        });
        let mut worker = worker_with(queue.clone(), store.clone(), dir.path());

        worker.run_cycle().await;

        let status = worker.status_snapshot("running");
        assert_eq!(status.messages_processed, 0);
        assert_eq!(status.messages_failed, 1);
        assert!(status.last_processed_id.is_none());

        // No upload attempted, message not acknowledged
        assert!(store.keys.lock().unwrap().is_empty());
        assert!(queue.acknowledged.lock().unwrap().is_empty());

        let dead_lettered = queue.dead_lettered.lock().unwrap();
        assert_eq!(dead_lettered.len(), 1);
        assert!(dead_lettered[0].1.starts_with("invalid format"));
    }

    #[tokio::test]
    async fn test_upload_failure_is_dead_lettered_and_not_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(FakeQueue::new(vec![message("msg_cccccccccccccccc", "h1")]));
        let mut worker = worker_with(queue.clone(), Arc::new(FailingStore), dir.path());

        worker.run_cycle().await;

        let status = worker.status_snapshot("running");
        assert_eq!(status.messages_processed, 0);
        assert_eq!(status.messages_failed, 1);
        assert!(queue.acknowledged.lock().unwrap().is_empty());

        let dead_lettered = queue.dead_lettered.lock().unwrap();
        assert_eq!(dead_lettered.len(), 1);
        assert!(dead_lettered[0].1.starts_with("upload error"));
    }

    #[tokio::test]
    async fn test_acknowledge_failure_is_not_counted_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(FakeQueue::failing_acks(vec![message(
            "msg_dddddddddddddddd",
            "h1",
        )]));
        let store = Arc::new(LocalObjectStore::new(dir.path().join("uploads")));
        let mut worker = worker_with(queue.clone(), store, dir.path());

        worker.run_cycle().await;

        // Archived but unacked: neither processed nor failed, no dead-letter
        let status = worker.status_snapshot("running");
        assert_eq!(status.messages_processed, 0);
        assert_eq!(status.messages_failed, 0);
        assert!(status.last_processed_id.is_none());
        assert!(queue.dead_lettered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_receipt_handle_is_a_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(FakeQueue::new(vec![message("msg_eeeeeeeeeeeeeeee", "")]));
        let store = Arc::new(LocalObjectStore::new(dir.path().join("uploads")));
        let mut worker = worker_with(queue.clone(), store, dir.path());

        worker.run_cycle().await;

        let status = worker.status_snapshot("running");
        assert_eq!(status.messages_failed, 1);

        let dead_lettered = queue.dead_lettered.lock().unwrap();
        assert_eq!(dead_lettered.len(), 1);
        assert!(dead_lettered[0].1.starts_with("processing error"));
    }

    #[tokio::test]
    async fn test_run_writes_final_snapshot_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(FakeQueue::new(vec![message("msg_ffffffffffffffff", "h1")]));
        let store = Arc::new(LocalObjectStore::new(dir.path().join("uploads")));
        let status_writer = StatusWriter::new(dir.path());
        let status_path = status_writer.path().to_path_buf();

        let worker = ArchiveWorker::new(
            queue,
            Uploader::new(store, "emails"),
            status_writer,
            WorkerConfig {
                poll_interval_seconds: 0,
                ..WorkerConfig::default()
            },
        );

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        // Let the first cycle complete, then request shutdown
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let written = tokio::fs::read(&status_path).await.unwrap();
        let snapshot: WorkerStatus = serde_json::from_slice(&written).unwrap();
        assert_eq!(snapshot.status, "stopped");
        assert_eq!(snapshot.messages_processed, 1);
        assert_eq!(snapshot.messages_failed, 0);
        assert_eq!(
            snapshot.last_processed_id.as_deref(),
            Some("msg_ffffffffffffffff")
        );
    }
}
