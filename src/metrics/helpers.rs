//! Small recording helpers so call sites stay one line.

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::*;
use crate::queue::EventKind;
use crate::reconnect::ConnectionState;

/// Encode all registered metrics in Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

pub struct QueueMetrics;

impl QueueMetrics {
    pub fn record_enqueued(kind: EventKind) {
        QUEUE_ENQUEUED_TOTAL.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn record_rejected() {
        QUEUE_REJECTED_TOTAL.inc();
    }

    pub fn record_delivered(kind: EventKind) {
        QUEUE_DELIVERED_TOTAL.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn record_expired() {
        QUEUE_EXPIRED_TOTAL.inc();
    }

    pub fn record_dropped() {
        QUEUE_DROPPED_TOTAL.inc();
    }

    pub fn set_pending(pending: usize) {
        QUEUE_PENDING.set(pending as i64);
    }
}

pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn record_attempt(transport: &str, elapsed: Duration, success: bool) {
        DELIVERY_LATENCY
            .with_label_values(&[transport])
            .observe(elapsed.as_secs_f64());
        if !success {
            DELIVERY_FAILURES_TOTAL.with_label_values(&[transport]).inc();
        }
    }
}

pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_reconnect_attempt() {
        RECONNECT_ATTEMPTS_TOTAL.inc();
    }

    pub fn set_state(state: ConnectionState) {
        let value = match state {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        };
        CONNECTION_STATE.set(value);
    }

    pub fn set_online(online: bool) {
        ONLINE.set(if online { 1 } else { 0 });
    }
}
