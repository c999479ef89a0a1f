//! User-facing notification sink.
//!
//! The delivery queue and the transports report things the user should see
//! ("message lost", "connection restored") and backend replies through this
//! module. Every call is fire-and-forget: nothing here can fail the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of the broadcast buffer; slow subscribers lag rather than block
const UI_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Events pushed to the UI layer
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum UiEvent {
    #[serde(rename = "notice")]
    Notice {
        message: String,
        severity: Severity,
        at: DateTime<Utc>,
    },
    #[serde(rename = "reply")]
    Reply {
        payload: serde_json::Value,
        at: DateTime<Utc>,
    },
}

impl UiEvent {
    pub fn notice(message: impl Into<String>, severity: Severity) -> Self {
        Self::Notice {
            message: message.into(),
            severity,
            at: Utc::now(),
        }
    }

    pub fn reply(payload: serde_json::Value) -> Self {
        Self::Reply {
            payload,
            at: Utc::now(),
        }
    }

    /// SSE event name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Notice { .. } => "notice",
            Self::Reply { .. } => "reply",
        }
    }
}

/// One-way notification sink
pub trait UiSink: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Broadcast-backed sink that the event stream endpoint subscribes to.
#[derive(Clone)]
pub struct UiChannel {
    tx: broadcast::Sender<UiEvent>,
}

impl UiChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(UI_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }

    /// Forward a backend reply to the UI
    pub fn reply(&self, payload: serde_json::Value) {
        self.publish(UiEvent::reply(payload));
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn publish(&self, event: UiEvent) {
        // No subscribers is the normal headless case
        if self.tx.send(event).is_err() {
            tracing::trace!("UI event dropped, no subscribers");
        }
    }
}

impl Default for UiChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl UiSink for UiChannel {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Error => tracing::warn!(message = %message, "UI notice"),
            _ => tracing::debug!(message = %message, ?severity, "UI notice"),
        }
        self.publish(UiEvent::notice(message, severity));
    }
}

/// Sink that only logs
pub struct LogSink;

impl UiSink for LogSink {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => tracing::info!(message = %message, "UI notice"),
            Severity::Warning => tracing::warn!(message = %message, "UI notice"),
            Severity::Error => tracing::error!(message = %message, "UI notice"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_delivers_notice_to_subscriber() {
        let channel = UiChannel::new();
        let mut rx = channel.subscribe();

        channel.notify("Connection restored", Severity::Info);

        match rx.recv().await.unwrap() {
            UiEvent::Notice { message, severity, .. } => {
                assert_eq!(message, "Connection restored");
                assert_eq!(severity, Severity::Info);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_notify_without_subscribers_is_silent() {
        let channel = UiChannel::new();
        channel.notify("nobody listening", Severity::Error);
        channel.reply(serde_json::json!({"response": "hi"}));
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn test_reply_reaches_every_subscriber() {
        let channel = UiChannel::new();
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        channel.reply(serde_json::json!({"response": "hi"}));

        let a = tokio_test::assert_ok!(first.try_recv());
        let b = tokio_test::assert_ok!(second.try_recv());
        assert_eq!(a.kind(), "reply");
        assert_eq!(b.kind(), "reply");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = UiEvent::notice("lost", Severity::Warning);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "notice");
        assert_eq!(json["severity"], "warning");
        assert_eq!(event.kind(), "notice");

        let reply = UiEvent::reply(serde_json::json!({"response": "ok"}));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "reply");
        assert_eq!(json["payload"]["response"], "ok");
    }
}
