// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;

// Delivery core
pub mod connectivity;
pub mod queue;
pub mod reconnect;
pub mod transport;
pub mod ui;

// Application layer
pub mod api;
pub mod server;
pub mod sse;

// Supporting modules
pub mod shutdown;
pub mod telemetry;
