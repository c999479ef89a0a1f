//! API layer - HTTP endpoint handlers for the local control surface.

mod events;
mod health;
mod metrics;
mod routes;

pub use events::{
    enqueue_event, queue_stats, set_connectivity, ConnectivityRequest, ConnectivityResponse,
    EnqueueResponse,
};
pub use health::{health, HealthResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
