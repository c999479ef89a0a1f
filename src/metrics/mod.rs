//! Prometheus metrics for the relay.
//!
//! - Queue metrics (enqueued, delivered, expired, dropped, pending)
//! - Delivery metrics (failed attempts, latency by transport)
//! - Connection metrics (reconnect attempts, connection state, online flag)

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, DeliveryMetrics, QueueMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "aris_relay";

lazy_static! {
    // ============================================================================
    // Queue Metrics
    // ============================================================================

    /// Events accepted into the queue, by kind
    pub static ref QUEUE_ENQUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_enqueued_total", METRIC_PREFIX),
        "Total events accepted into the delivery queue",
        &["kind"]
    ).unwrap();

    /// Blank events ignored at enqueue
    pub static ref QUEUE_REJECTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_rejected_total", METRIC_PREFIX),
        "Total blank events ignored at enqueue"
    ).unwrap();

    /// Events delivered successfully
    pub static ref QUEUE_DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_delivered_total", METRIC_PREFIX),
        "Total events delivered to the backend",
        &["kind"]
    ).unwrap();

    /// Events discarded for staleness before any attempt
    pub static ref QUEUE_EXPIRED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_expired_total", METRIC_PREFIX),
        "Total events expired while waiting in the queue"
    ).unwrap();

    /// Events dropped after exhausting retries
    pub static ref QUEUE_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_dropped_total", METRIC_PREFIX),
        "Total events dropped after exhausting delivery retries"
    ).unwrap();

    /// Events currently waiting
    pub static ref QUEUE_PENDING: IntGauge = register_int_gauge!(
        format!("{}_queue_pending", METRIC_PREFIX),
        "Events currently waiting in the delivery queue"
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Failed delivery attempts by transport
    pub static ref DELIVERY_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivery_failures_total", METRIC_PREFIX),
        "Total failed delivery attempts",
        &["transport"]
    ).unwrap();

    /// Time spent inside a single deliver call
    pub static ref DELIVERY_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_delivery_latency_seconds", METRIC_PREFIX),
        "Latency of a single delivery attempt in seconds",
        &["transport"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Reconnect attempts of persistent transports
    pub static ref RECONNECT_ATTEMPTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reconnect_attempts_total", METRIC_PREFIX),
        "Total reconnect attempts by persistent-connection transports"
    ).unwrap();

    /// Connection state (0=disconnected, 1=connecting, 2=connected)
    pub static ref CONNECTION_STATE: IntGauge = register_int_gauge!(
        format!("{}_connection_state", METRIC_PREFIX),
        "Persistent transport state (0=disconnected, 1=connecting, 2=connected)"
    ).unwrap();

    /// Connectivity signal (1=online, 0=offline)
    pub static ref ONLINE: IntGauge = register_int_gauge!(
        format!("{}_online", METRIC_PREFIX),
        "Connectivity signal (1=online, 0=offline)"
    ).unwrap();
}
