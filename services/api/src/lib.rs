//! Mailstream Ingestion API
//!
//! REST endpoint for submitting email records into the Mailstream pipeline.
//! Each valid submission is wrapped in an envelope `{message_id, timestamp,
//! data}` and published to the ingestion queue; the archive worker drains
//! that queue and writes every envelope to durable storage.
//!
//! Validation, authentication, and enqueueing all happen here; once an
//! envelope is accepted the caller holds the `message_id` it can later use
//! to locate the archived object.

pub mod config;
pub mod publisher;
pub mod routes;
pub mod types;

pub use config::Config;
pub use publisher::{new_message_id, Envelope, LogPublisher, Publisher, SqsPublisher};
pub use routes::{create_router, AppState};
pub use types::{EmailData, SendEmailRequest, SendEmailResponse, ValidationError};
