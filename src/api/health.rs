//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::reconnect::ConnectionState;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub transport: TransportHealthResponse,
    pub online: bool,
    pub queue: QueueHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct TransportHealthResponse {
    pub kind: String,
    /// Only for transports holding a persistent connection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueueHealthResponse {
    pub pending: usize,
    pub is_processing: bool,
    pub retry_count: u32,
}

/// GET /health
///
/// `degraded` while offline or while a persistent connection is down; the
/// relay keeps accepting events either way.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue = state.queue.stats();
    let connection = state.connection_state.as_ref().map(|rx| *rx.borrow());

    let connected = connection.is_none_or(|c| c == ConnectionState::Connected);
    let status = if queue.online && connected {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        transport: TransportHealthResponse {
            kind: state.queue.transport_name().to_string(),
            connection: connection.map(|c| c.as_str().to_string()),
        },
        online: queue.online,
        queue: QueueHealthResponse {
            pending: queue.pending,
            is_processing: queue.is_processing,
            retry_count: queue.retry_count,
        },
    })
}
