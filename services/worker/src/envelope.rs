use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message envelope produced by the ingestion API.
///
/// The `data` payload is owned by the producer and is carried through the
/// pipeline untouched; the worker only ever reads `message_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique message identifier assigned at enqueue time
    pub message_id: String,
    /// Enqueue timestamp (RFC 3339, UTC), set by the producer
    pub timestamp: String,
    /// Opaque application payload, round-tripped byte-for-byte
    pub data: serde_json::Value,
}

/// A message as received from the queue.
///
/// The receipt handle is only valid until the queue's visibility timeout
/// expires or the message is acknowledged.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Queue-assigned message identifier, if the backend provides one
    pub queue_message_id: Option<String>,
    /// Raw message body, expected to parse as an [`Envelope`]
    pub body: String,
    /// Acknowledgment token for delete/dead-letter operations
    pub receipt_handle: String,
    /// Message attributes carried alongside the body
    pub attributes: HashMap<String, String>,
}

/// Body written to the dead-letter queue for a failed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterBody {
    /// The original message body, verbatim
    pub original_message: String,
    /// Human-readable failure reason
    pub error: String,
    /// When the message was dead-lettered (RFC 3339, UTC)
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_envelope() {
        let json = r#"{
            "message_id": "msg_0123456789abcdef",
            "timestamp": "2024-01-15T10:30:00Z",
            "data": {
                "subject": "Quarterly report",
                "sender": "alice@example.com",
                "event_time": "1705314600",
                "body": "See attached."
            }
        }"#;

        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.message_id, "msg_0123456789abcdef");
        assert_eq!(envelope.data["sender"], "alice@example.com");
    }

    #[test]
    fn test_envelope_rejects_missing_message_id() {
        let json = r#"{"timestamp": "2024-01-15T10:30:00Z", "data": {}}"#;
        assert!(serde_json::from_str::<Envelope>(json).is_err());
    }

    #[test]
    fn test_data_payload_is_opaque_passthrough() {
        // Fields the worker knows nothing about must survive re-serialization.
        let json = r#"{
            "message_id": "msg_00000000000000aa",
            "timestamp": "2024-01-15T10:30:00Z",
            "data": {"subject": "s", "x_custom_field": [1, 2, 3], "nested": {"deep": true}}
        }"#;

        let envelope: Envelope = serde_json::from_str(json).unwrap();
        let round_tripped: Envelope =
            serde_json::from_str(&serde_json::to_string(&envelope).unwrap()).unwrap();

        assert_eq!(envelope, round_tripped);
        assert_eq!(round_tripped.data["x_custom_field"][2], 3);
        assert_eq!(round_tripped.data["nested"]["deep"], true);
    }

    #[test]
    fn test_dead_letter_body_shape() {
        let body = DeadLetterBody {
            original_message: "not json".to_string(),
            error: "invalid format: expected value".to_string(),
            timestamp: "2024-01-15T10:30:00Z".to_string(),
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["original_message"], "not json");
        assert!(json["error"].as_str().unwrap().starts_with("invalid format"));
    }
}
