//! Queue client abstraction over receive / acknowledge / dead-letter.
//!
//! The live implementation targets SQS; the offline implementation is a
//! no-op stub used for hermetic runs. `receive` never fails the caller:
//! transient errors are logged and surface as an empty batch, leaving retry
//! to the queue's own visibility-timeout and redrive policy.

use crate::config::QueueConfig;
use crate::envelope::{DeadLetterBody, QueueMessage};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::config::Builder as SqsConfigBuilder;
use aws_sdk_sqs::types::MessageAttributeValue;
use aws_sdk_sqs::Client as SqsClient;
use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// SQS caps a single receive call at 10 messages
const MAX_RECEIVE_BATCH: usize = 10;

/// Errors that can occur during queue operations
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to acknowledge message: {0}")]
    Acknowledge(String),

    #[error("Message has no receipt handle")]
    MissingReceiptHandle,
}

/// Queue operations the worker depends on.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Fetch up to `max_messages` messages. Errors are logged and yield an
    /// empty batch; the caller must tolerate transient receive failures.
    async fn receive(&self, max_messages: usize) -> Vec<QueueMessage>;

    /// Remove a message from the queue. Idempotent: acknowledging an
    /// already-removed message succeeds.
    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Best-effort move to the dead-letter queue with a failure reason.
    /// Failures are logged, never raised.
    async fn dead_letter(&self, message: &QueueMessage, reason: &str);
}

/// SQS-backed queue client
pub struct SqsQueue {
    client: SqsClient,
    queue_url: String,
    dead_letter_url: Option<String>,
    max_messages_per_poll: usize,
    receive_wait_seconds: i32,
}

impl SqsQueue {
    /// Create a new SQS queue client from configuration
    pub async fn new(config: &QueueConfig) -> anyhow::Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut sqs_config_builder = SqsConfigBuilder::from(&aws_config);

        if let Some(ref endpoint_url) = config.endpoint_url {
            sqs_config_builder = sqs_config_builder.endpoint_url(endpoint_url);
        }

        let client = SqsClient::from_conf(sqs_config_builder.build());

        info!(
            queue_url = %config.queue_url,
            dead_letter_url = ?config.dead_letter_url,
            "SQS queue client initialized"
        );

        Ok(Self {
            client,
            queue_url: config.queue_url.clone(),
            dead_letter_url: config.dead_letter_url.clone(),
            max_messages_per_poll: config.max_messages_per_poll,
            receive_wait_seconds: config.receive_wait_seconds,
        })
    }
}

#[async_trait]
impl Queue for SqsQueue {
    async fn receive(&self, max_messages: usize) -> Vec<QueueMessage> {
        let batch_size = max_messages
            .min(self.max_messages_per_poll)
            .min(MAX_RECEIVE_BATCH)
            .max(1);

        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(batch_size as i32)
            .wait_time_seconds(self.receive_wait_seconds)
            .message_attribute_names("All")
            .send()
            .await;

        let messages = match response {
            Ok(output) => output.messages.unwrap_or_default(),
            Err(e) => {
                error!(error = %e, "Failed to receive messages from queue");
                metrics::counter!("archiver.queue.receive_errors").increment(1);
                return Vec::new();
            }
        };

        messages
            .into_iter()
            .map(|m| {
                let attributes: HashMap<String, String> = m
                    .message_attributes
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|(k, v)| v.string_value.map(|s| (k, s)))
                    .collect();

                QueueMessage {
                    queue_message_id: m.message_id,
                    body: m.body.unwrap_or_default(),
                    receipt_handle: m.receipt_handle.unwrap_or_default(),
                    attributes,
                }
            })
            .collect()
    }

    #[instrument(skip(self, message), fields(queue_message_id = ?message.queue_message_id))]
    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), QueueError> {
        if message.receipt_handle.is_empty() {
            return Err(QueueError::MissingReceiptHandle);
        }

        let result = self
            .client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .send()
            .await;

        match result {
            Ok(_) => {
                debug!("Message acknowledged");
                Ok(())
            }
            Err(e) => {
                // The message was already removed or the handle expired;
                // the data is not at risk, so this is not an error.
                let already_gone = e
                    .as_service_error()
                    .map(|se| se.is_receipt_handle_is_invalid())
                    .unwrap_or(false);

                if already_gone {
                    debug!("Receipt handle no longer valid, treating as acknowledged");
                    Ok(())
                } else {
                    Err(QueueError::Acknowledge(e.to_string()))
                }
            }
        }
    }

    #[instrument(skip(self, message), fields(queue_message_id = ?message.queue_message_id, reason = %reason))]
    async fn dead_letter(&self, message: &QueueMessage, reason: &str) {
        let Some(ref dead_letter_url) = self.dead_letter_url else {
            warn!("No dead-letter queue configured, dropping failure record");
            return;
        };

        let body = DeadLetterBody {
            original_message: message.body.clone(),
            error: reason.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };

        let payload = match serde_json::to_string(&body) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to serialize dead-letter body");
                return;
            }
        };

        let reason_attribute = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(reason)
            .build();

        let mut request = self
            .client
            .send_message()
            .queue_url(dead_letter_url)
            .message_body(payload);

        if let Ok(attribute) = reason_attribute {
            request = request.message_attributes("error-reason", attribute);
        }

        match request.send().await {
            Ok(_) => {
                error!("Message sent to dead-letter queue");
                metrics::counter!("archiver.queue.dead_lettered").increment(1);
            }
            Err(e) => {
                error!(error = %e, "Failed to send message to dead-letter queue");
            }
        }
    }
}

/// Offline queue stub: empty receives, no-op acknowledgments, logged
/// dead-letters. Lets the worker run without any queue backend.
pub struct NullQueue;

#[async_trait]
impl Queue for NullQueue {
    async fn receive(&self, _max_messages: usize) -> Vec<QueueMessage> {
        debug!("Offline queue enabled, skipping receive");
        Vec::new()
    }

    async fn acknowledge(&self, _message: &QueueMessage) -> Result<(), QueueError> {
        debug!("Offline queue enabled, skipping acknowledge");
        Ok(())
    }

    async fn dead_letter(&self, _message: &QueueMessage, reason: &str) {
        error!(reason = %reason, "Offline queue enabled, dead-letter skipped");
    }
}
