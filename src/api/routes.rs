use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};
use crate::sse::sse_handler;

use super::events::{enqueue_event, queue_stats, set_connectivity};
use super::health::health;
use super::metrics::prometheus_metrics;

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health & metrics
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        // Control endpoints, behind the optional API key
        .nest(
            "/api/v1",
            Router::new()
                .route("/events", post(enqueue_event))
                .route("/events/stream", get(sse_handler))
                .route("/connectivity", post(set_connectivity))
                .route("/queue", get(queue_stats))
                .route_layer(middleware::from_fn_with_state(state, api_key_auth)),
        )
}
