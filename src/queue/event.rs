//! Queued event types and the per-event delivery state machine.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Payload kind, used for metrics labels and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Message,
    Voice,
    Command,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Voice => "voice",
            Self::Command => "command",
        }
    }
}

/// User-originated data waiting for delivery.
///
/// Voice audio travels as raw bytes inside the relay and as base64 on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventPayload {
    Message {
        content: String,
    },
    Voice {
        #[serde(with = "base64_bytes")]
        audio: Vec<u8>,
        #[serde(default = "default_voice_mime")]
        mime_type: String,
    },
    Command {
        command: String,
        #[serde(default)]
        args: serde_json::Value,
    },
}

fn default_voice_mime() -> String {
    "audio/ogg".to_string()
}

impl EventPayload {
    pub fn message(content: impl Into<String>) -> Self {
        Self::Message {
            content: content.into(),
        }
    }

    pub fn voice(audio: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::Voice {
            audio,
            mime_type: mime_type.into(),
        }
    }

    pub fn command(command: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            args: serde_json::Value::Null,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message { .. } => EventKind::Message,
            Self::Voice { .. } => EventKind::Voice,
            Self::Command { .. } => EventKind::Command,
        }
    }

    /// Blank input is ignored rather than queued
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Message { content } => content.trim().is_empty(),
            Self::Voice { audio, .. } => audio.is_empty(),
            Self::Command { command, .. } => command.trim().is_empty(),
        }
    }
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Lifecycle of a single queued event.
///
/// `Delivered`, `Expired` and `Dropped` are terminal; expiry is only ever
/// decided from `Pending`, i.e. before an attempt, never after one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    InFlight,
    Delivered,
    Expired,
    Dropped,
}

/// Inputs that drive [`DeliveryState`] transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Head-of-queue age check; `expired` is the outcome of the check
    Inspected { expired: bool },
    Succeeded,
    /// A delivery attempt failed; `attempts` counts consecutive failures so far
    Failed { attempts: u32 },
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Expired | Self::Dropped)
    }

    /// Apply a trigger. Triggers that do not apply to the current state leave it unchanged.
    pub fn advance(self, trigger: Trigger, max_retries: u32) -> Self {
        match (self, trigger) {
            (Self::Pending, Trigger::Inspected { expired: true }) => Self::Expired,
            (Self::Pending, Trigger::Inspected { expired: false }) => Self::InFlight,
            (Self::InFlight, Trigger::Succeeded) => Self::Delivered,
            (Self::InFlight, Trigger::Failed { attempts }) if attempts >= max_retries => {
                Self::Dropped
            }
            (Self::InFlight, Trigger::Failed { .. }) => Self::Pending,
            (state, _) => state,
        }
    }
}

/// An event owned by the delivery queue.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub id: Uuid,
    pub payload: Arc<EventPayload>,
    /// Monotonic enqueue time, the reference point for staleness
    pub enqueued_at: Instant,
    /// Wall-clock enqueue time, reported on the wire
    pub created_at: DateTime<Utc>,
    pub state: DeliveryState,
}

impl QueuedEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: Arc::new(payload),
            enqueued_at: Instant::now(),
            created_at: Utc::now(),
            state: DeliveryState::Pending,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }

    /// Strictly older than `timeout`
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.age(now) > timeout
    }
}
