//! Event intake and queue control endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::queue::{EventPayload, QueueStats};
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectivityResponse {
    pub online: bool,
    /// Whether the request was a transition
    pub changed: bool,
}

/// POST /api/v1/events - queue a user event for delivery.
///
/// Returns as soon as the event is queued; delivery outcome is reported on
/// the event stream. Blank input is accepted but not queued.
#[tracing::instrument(name = "api.enqueue", skip(state, body))]
pub async fn enqueue_event(
    State(state): State<AppState>,
    body: std::result::Result<Json<EventPayload>, JsonRejection>,
) -> Result<Response> {
    let Json(payload) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let kind = payload.kind();

    let response = match state.queue.enqueue(payload) {
        Some(id) => {
            tracing::debug!(event_id = %id, kind = kind.as_str(), "Accepted event");
            (
                StatusCode::ACCEPTED,
                Json(EnqueueResponse {
                    queued: true,
                    id: Some(id),
                }),
            )
        }
        None => (
            StatusCode::OK,
            Json(EnqueueResponse {
                queued: false,
                id: None,
            }),
        ),
    };

    Ok(response.into_response())
}

/// POST /api/v1/connectivity - report the host's online state
#[tracing::instrument(name = "api.connectivity", skip(state, body))]
pub async fn set_connectivity(
    State(state): State<AppState>,
    body: std::result::Result<Json<ConnectivityRequest>, JsonRejection>,
) -> Result<Json<ConnectivityResponse>> {
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let changed = state.connectivity.set_online(request.online);

    Ok(Json(ConnectivityResponse {
        online: request.online,
        changed,
    }))
}

/// GET /api/v1/queue
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.queue.stats())
}
