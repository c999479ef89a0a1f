use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::queue::{EventPayload, QueuedEvent};

/// JSON shape shared by every transport:
/// `{"type":"message","content":"…","timestamp":"…","event_id":"…"}`
#[derive(Debug, Serialize)]
pub struct WireEnvelope<'a> {
    #[serde(flatten)]
    pub payload: &'a EventPayload,
    pub timestamp: DateTime<Utc>,
    pub event_id: Uuid,
}

impl<'a> WireEnvelope<'a> {
    pub fn new(event: &'a QueuedEvent) -> Self {
        Self {
            payload: &event.payload,
            timestamp: event.created_at,
            event_id: event.id,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
