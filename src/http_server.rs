use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tokio::net::TcpListener;

use crate::pipeline::{PipelineOutcome, Rejection, WebhookPipeline};
use crate::sync::SyncOutcome;
use crate::types::WebhookHeaders;

pub const WEBHOOK_PATH: &str = "/api/v1/webhooks/clerk";
pub const HEALTH_PATH: &str = "/api/v1/health";

pub const SIGNATURE_HEADER: &str = "svix-signature";
pub const TIMESTAMP_HEADER: &str = "svix-timestamp";
pub const EVENT_ID_HEADER: &str = "svix-id";

#[derive(Clone)]
pub struct ServerState {
    pipeline: Arc<WebhookPipeline>,
}

impl ServerState {
    pub fn new(pipeline: Arc<WebhookPipeline>) -> Self {
        Self { pipeline }
    }
}

pub fn router(state: ServerState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(handle_webhook))
        .route(HEALTH_PATH, get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Serve until ctrl-c.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "webhook receiver listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn webhook_headers(headers: &HeaderMap) -> WebhookHeaders {
    WebhookHeaders {
        signature: header_value(headers, SIGNATURE_HEADER),
        timestamp: header_value(headers, TIMESTAMP_HEADER),
        event_id: header_value(headers, EVENT_ID_HEADER),
    }
}

async fn handle_webhook(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let headers = webhook_headers(&headers);
    tracing::debug!(event_id = headers.event_id.as_deref().unwrap_or("-"), "received webhook");

    let outcome = state.pipeline.handle(&body, &headers, Utc::now()).await;
    outcome_response(outcome)
}

pub fn status_for(outcome: PipelineOutcome) -> StatusCode {
    match outcome {
        PipelineOutcome::Rejected(Rejection::InvalidSignature) => StatusCode::UNAUTHORIZED,
        PipelineOutcome::Rejected(Rejection::Malformed) => StatusCode::BAD_REQUEST,
        PipelineOutcome::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineOutcome::Processed(_) => StatusCode::OK,
    }
}

fn outcome_response(outcome: PipelineOutcome) -> Response {
    let body = match outcome {
        PipelineOutcome::Rejected(Rejection::InvalidSignature) => {
            json!({ "error": "Invalid signature" })
        }
        PipelineOutcome::Rejected(Rejection::Malformed) => json!({ "error": "Malformed payload" }),
        PipelineOutcome::Failed(_) => json!({ "error": "Internal server error" }),
        PipelineOutcome::Processed(SyncOutcome::Applied) => json!({ "status": "success" }),
        PipelineOutcome::Processed(SyncOutcome::Deleted) => {
            json!({ "status": "success", "action": "deleted" })
        }
        PipelineOutcome::Processed(SyncOutcome::IgnoredNoEmail) => {
            json!({ "status": "ignored", "reason": "no email" })
        }
        PipelineOutcome::Processed(SyncOutcome::IgnoredUnknownType) => {
            json!({ "status": "ignored", "reason": "unhandled event type" })
        }
    };
    (status_for(outcome), Json(body)).into_response()
}

async fn health(State(state): State<ServerState>) -> Response {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    match state.pipeline.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "UP", "timestamp": timestamp })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "DOWN", "timestamp": timestamp })),
            )
                .into_response()
        }
    }
}
