//! Queue publisher for validated email envelopes.
//!
//! The live implementation targets SQS; the offline implementation logs the
//! envelope instead, letting the API run without a queue backend.

use crate::config::QueueConfig;
use crate::types::EmailData;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::config::Builder as SqsConfigBuilder;
use aws_sdk_sqs::types::MessageAttributeValue;
use aws_sdk_sqs::Client as SqsClient;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

/// Errors that can occur while publishing an envelope
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to send message to queue: {0}")]
    Send(String),
}

/// The envelope published to the queue. The worker reads `message_id` and
/// archives the rest verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message identifier, `msg_` followed by 16 hex characters
    pub message_id: String,
    /// Enqueue timestamp (RFC 3339, UTC)
    pub timestamp: String,
    /// The validated email record
    pub data: EmailData,
}

/// Generate a fresh message identifier, `msg_<16 hex chars>`
pub fn new_message_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("msg_{}", &hex[..16])
}

/// Publishes envelopes to the ingestion queue.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one envelope
    async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError>;

    /// Destination queue URL, if the backend has one
    fn queue_url(&self) -> Option<&str>;
}

/// SQS-backed publisher
pub struct SqsPublisher {
    client: SqsClient,
    queue_url: String,
}

impl SqsPublisher {
    /// Create a new SQS publisher from configuration
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

        info!(queue_url = %config.queue_url, "SQS publisher initialized");

        Ok(Self {
            client,
            queue_url: config.queue_url.clone(),
        })
    }

    fn string_attribute(value: &str) -> Option<MessageAttributeValue> {
        MessageAttributeValue::builder()
            .data_type("String")
            .string_value(value)
            .build()
            .ok()
    }
}

#[async_trait]
impl Publisher for SqsPublisher {
    #[instrument(skip(self, envelope), fields(message_id = %envelope.message_id))]
    async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError> {
        let body = serde_json::to_string(envelope)?;

        let mut request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body);

        // Attributes allow downstream filtering without a full-body parse
        for (name, value) in [
            ("message_id", envelope.message_id.as_str()),
            ("sender", envelope.data.sender.as_str()),
            ("subject", envelope.data.subject.as_str()),
        ] {
            if let Some(attribute) = Self::string_attribute(value) {
                request = request.message_attributes(name, attribute);
            }
        }

        request
            .send()
            .await
            .map_err(|e| PublishError::Send(e.to_string()))?;

        info!("Envelope published to queue");
        Ok(())
    }

    fn queue_url(&self) -> Option<&str> {
        Some(&self.queue_url)
    }
}

/// Offline publisher: logs the envelope instead of enqueuing it.
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError> {
        let body = serde_json::to_string_pretty(envelope)?;
        info!(
            message_id = %envelope.message_id,
            sender = %envelope.data.sender,
            subject = %envelope.data.subject,
            envelope = %body,
            "Offline queue enabled, envelope logged instead of published"
        );
        Ok(())
    }

    fn queue_url(&self) -> Option<&str> {
        None
    }
}
