//! HTTP routes for the ingestion API.

use crate::config::Config;
use crate::publisher::{new_message_id, Envelope, Publisher};
use crate::types::{
    ConfigResponse, ErrorResponse, HealthResponse, SendEmailRequest, SendEmailResponse,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<dyn Publisher>,
    pub config: Arc<Config>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/config", get(get_config))
        .route("/send-email", post(send_email))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service.name.clone(),
        version: state.config.service.version.clone(),
        timestamp: Utc::now().to_rfc3339(),
        queue_available: state.publisher.queue_url().is_some(),
    })
}

/// Advertise the active validation limits
async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(ConfigResponse {
        service_name: state.config.service.name.clone(),
        api_version: state.config.service.version.clone(),
        max_subject_length: state.config.limits.max_subject_length,
        max_sender_length: state.config.limits.max_sender_length,
        max_body_length: state.config.limits.max_body_length,
        max_event_age_days: state.config.limits.max_event_age_days,
    })
}

/// Validate, wrap, and enqueue one email record
#[instrument(skip(state, request))]
async fn send_email(
    State(state): State<AppState>,
    Json(request): Json<SendEmailRequest>,
) -> Result<Json<SendEmailResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !constant_time_eq(request.token.as_bytes(), state.config.auth.token.as_bytes()) {
        warn!("Invalid token provided");
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(
                "INVALID_TOKEN",
                "Invalid authentication token",
            )),
        ));
    }

    if let Err(e) = request.data.validate(&state.config.limits, Utc::now()) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new("VALIDATION_ERROR", e.to_string())),
        ));
    }

    let message_id = new_message_id();
    let timestamp = Utc::now().to_rfc3339();
    let envelope = Envelope {
        message_id: message_id.clone(),
        timestamp: timestamp.clone(),
        data: request.data,
    };

    if let Err(e) = state.publisher.publish(&envelope).await {
        error!(error = %e, message_id = %message_id, "Failed to publish envelope");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(
                "PUBLISH_ERROR",
                "Failed to publish message to queue",
            )),
        ));
    }

    info!(
        message_id = %message_id,
        sender = %envelope.data.sender,
        "Email received and queued"
    );

    Ok(Json(SendEmailResponse {
        status: "accepted".to_string(),
        message_id,
        timestamp,
        queue_url: state.publisher.queue_url().map(String::from),
    }))
}

/// Compare two byte strings in time independent of where they differ.
///
/// The shared-secret token check must not leak match length through timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
