//! Request/response types for the ingestion API and their validation rules.

use crate::config::LimitsConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A submitted email record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailData {
    /// Email subject line
    pub subject: String,
    /// Sender address or display name
    pub sender: String,
    /// Original event time as a Unix timestamp in string form
    pub event_time: String,
    /// Email body text
    pub body: String,
}

/// Body of `POST /send-email`
#[derive(Debug, Clone, Deserialize)]
pub struct SendEmailRequest {
    /// The email record to ingest
    pub data: EmailData,
    /// Shared-secret authentication token
    pub token: String,
}

/// Successful ingestion response
#[derive(Debug, Serialize)]
pub struct SendEmailResponse {
    pub status: String,
    pub message_id: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_url: Option<String>,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error_code: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error_code: error_code.into(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Health endpoint response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: String,
    pub queue_available: bool,
}

/// Config endpoint response, advertising the active validation limits
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub service_name: String,
    pub api_version: String,
    pub max_subject_length: usize,
    pub max_sender_length: usize,
    pub max_body_length: usize,
    pub max_event_age_days: i64,
}

/// Validation failures for submitted email records
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} exceeds maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("event_time must be a valid Unix timestamp (numeric string)")]
    NonNumericTimestamp,

    #[error("event_time cannot be in the future")]
    FutureTimestamp,

    #[error("event_time cannot be older than {max_days} days")]
    StaleTimestamp { max_days: i64 },
}

impl EmailData {
    /// Validate the record against the configured limits, evaluating the
    /// event timestamp against `now`.
    pub fn validate(&self, limits: &LimitsConfig, now: DateTime<Utc>) -> Result<(), ValidationError> {
        check_length("subject", &self.subject, limits.max_subject_length)?;
        check_length("sender", &self.sender, limits.max_sender_length)?;
        check_length("body", &self.body, limits.max_body_length)?;

        let event_time: i64 = self
            .event_time
            .parse()
            .map_err(|_| ValidationError::NonNumericTimestamp)?;

        let now_secs = now.timestamp();
        if event_time > now_secs {
            return Err(ValidationError::FutureTimestamp);
        }

        // Compare in seconds so a timestamp just past the limit is not
        // truncated back under it
        let age_seconds = now_secs - event_time;
        if age_seconds > limits.max_event_age_days * 24 * 60 * 60 {
            return Err(ValidationError::StaleTimestamp {
                max_days: limits.max_event_age_days,
            });
        }

        Ok(())
    }
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limits() -> LimitsConfig {
        LimitsConfig::default()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn valid_data() -> EmailData {
        EmailData {
            subject: "Quarterly report".to_string(),
            sender: "alice@example.com".to_string(),
            // One hour before `now`
            event_time: (now().timestamp() - 3600).to_string(),
            body: "See attached.".to_string(),
        }
    }

    #[test]
    fn test_valid_record_passes() {
        assert!(valid_data().validate(&limits(), now()).is_ok());
    }

    #[test]
    fn test_empty_fields_rejected() {
        for field in ["subject", "sender", "body"] {
            let mut data = valid_data();
            match field {
                "subject" => data.subject.clear(),
                "sender" => data.sender.clear(),
                _ => data.body.clear(),
            }
            assert_eq!(
                data.validate(&limits(), now()),
                Err(ValidationError::Empty { field })
            );
        }
    }

    #[test]
    fn test_oversized_subject_rejected() {
        let mut data = valid_data();
        data.subject = "x".repeat(256);
        assert_eq!(
            data.validate(&limits(), now()),
            Err(ValidationError::TooLong {
                field: "subject",
                max: 255
            })
        );
    }

    #[test]
    fn test_oversized_body_rejected() {
        let mut data = valid_data();
        data.body = "x".repeat(5001);
        assert_eq!(
            data.validate(&limits(), now()),
            Err(ValidationError::TooLong {
                field: "body",
                max: 5000
            })
        );
    }

    #[test]
    fn test_non_numeric_timestamp_rejected() {
        let mut data = valid_data();
        data.event_time = "yesterday".to_string();
        assert_eq!(
            data.validate(&limits(), now()),
            Err(ValidationError::NonNumericTimestamp)
        );
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let mut data = valid_data();
        data.event_time = (now().timestamp() + 60).to_string();
        assert_eq!(
            data.validate(&limits(), now()),
            Err(ValidationError::FutureTimestamp)
        );
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let mut data = valid_data();
        data.event_time = (now().timestamp() - 8 * 24 * 3600).to_string();
        assert_eq!(
            data.validate(&limits(), now()),
            Err(ValidationError::StaleTimestamp { max_days: 7 })
        );
    }

    #[test]
    fn test_timestamp_just_past_max_age_rejected() {
        // 7 days and 1 hour old: inside the truncated eighth day, but
        // still older than the 7-day limit
        let mut data = valid_data();
        data.event_time = (now().timestamp() - (7 * 24 + 1) * 3600).to_string();
        assert_eq!(
            data.validate(&limits(), now()),
            Err(ValidationError::StaleTimestamp { max_days: 7 })
        );
    }

    #[test]
    fn test_seven_day_old_timestamp_accepted() {
        let mut data = valid_data();
        data.event_time = (now().timestamp() - 7 * 24 * 3600).to_string();
        assert!(data.validate(&limits(), now()).is_ok());
    }
}
