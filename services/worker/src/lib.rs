//! Mailstream Archive Worker
//!
//! Drains the email ingestion queue and durably archives each envelope to
//! object storage. The worker polls the queue on a fixed cadence, uploads
//! each message body to a time-partitioned key, then acknowledges the
//! message; failures are dead-lettered with a reason and redelivery is left
//! to the queue's own visibility-timeout policy.
//!
//! ## Architecture
//!
//! ```text
//! Ingestion API          Queue                    Archive
//! ┌────────────┐      ┌──────────┐            ┌─────────────────────┐
//! │ POST       │      │ envelope │   upload   │ emails/             │
//! │ /send-email│─────▶│ messages │──────────▶ │   {YYYY}/{MM}/{DD}/ │
//! └────────────┘      └──────────┘            │   {message_id}.json │
//!                          │  ack / DLQ       └─────────────────────┘
//!                          ▼
//!                    ┌──────────┐            ┌─────────────────────┐
//!                    │ Archive  │──────────▶ │ health/             │
//!                    │ Worker   │  snapshot  │   worker-status.json│
//!                    └──────────┘            └─────────────────────┘
//! ```
//!
//! Both the queue and the storage backend sit behind capability traits with
//! offline filesystem/no-op implementations, so the whole pipeline runs
//! hermetically without cloud dependencies.

pub mod config;
pub mod envelope;
pub mod health;
pub mod queue;
pub mod storage;
pub mod worker;

pub use config::Config;
pub use envelope::{DeadLetterBody, Envelope, QueueMessage};
pub use health::{StatusWriter, WorkerStatus};
pub use queue::{NullQueue, Queue, QueueError, SqsQueue};
pub use storage::{LocalObjectStore, ObjectStore, S3ObjectStore, StorageError, Uploader};
pub use worker::ArchiveWorker;
