//! Outbound transports.
//!
//! A transport delivers one queued event to the backend and reports success
//! or failure. Three bindings exist:
//! - `HttpTransport`: JSON POST per event
//! - `WebSocketTransport`: one text frame per event over a reconnecting socket
//! - `BridgeTransport`: one JSON line per event to the host process

mod bridge;
mod envelope;
mod factory;
mod http;
mod websocket;

pub use bridge::{BridgeTransport, BRIDGE_PAYLOAD_LIMIT};
pub use envelope::WireEnvelope;
pub use factory::{create_transport, TransportSet};
pub use http::HttpTransport;
pub use websocket::{WebSocketSupervisor, WebSocketTransport};

use async_trait::async_trait;
use thiserror::Error;

use crate::queue::QueuedEvent;

/// A single failed delivery attempt
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend responded with status {0}")]
    Status(u16),

    #[error("Backend rejected the event: {0}")]
    Rejected(String),

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Send did not complete within {0:?}")]
    SendTimeout(std::time::Duration),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },
}

/// Errors building a transport from configuration
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// The sole boundary to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs and metric labels
    fn name(&self) -> &'static str;

    /// Attempt to deliver one event
    async fn deliver(&self, event: &QueuedEvent) -> Result<(), DeliveryError>;
}
