//! SSE handler implementation.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::stream::Stream;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

use crate::server::AppState;
use crate::ui::UiEvent;

/// Control events emitted by the stream itself
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Connected {
        stream_id: Uuid,
        online: bool,
        pending: usize,
    },
    Lagged {
        missed: u64,
    },
}

/// GET /api/v1/events/stream
#[tracing::instrument(name = "sse.connect", skip(state))]
pub async fn sse_handler(State(state): State<AppState>) -> Response {
    let stream_id = Uuid::new_v4();
    let rx = state.ui.subscribe();
    let closing = state.streams_closing.subscribe();
    let stats = state.queue.stats();

    tracing::info!(
        stream_id = %stream_id,
        subscribers = state.ui.subscriber_count(),
        "UI event stream opened"
    );

    let connected = StreamEvent::Connected {
        stream_id,
        online: stats.online,
        pending: stats.pending,
    };

    Sse::new(create_sse_stream(rx, closing, stream_id, connected))
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(state.settings.server.stream_keepalive_secs))
                .text("heartbeat"),
        )
        .into_response()
}

fn create_sse_stream(
    rx: broadcast::Receiver<UiEvent>,
    mut closing: watch::Receiver<bool>,
    stream_id: Uuid,
    connected: StreamEvent,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let guard = StreamGuard {
        stream_id,
        opened_at: std::time::Instant::now(),
    };
    let connected_json = serde_json::to_string(&connected).unwrap_or_default();

    async_stream::stream! {
        yield Ok(Event::default().event("connected").data(connected_json));

        // Logs the close when the client goes away
        let _guard = guard;

        let mut events = BroadcastStream::new(rx);
        loop {
            if *closing.borrow_and_update() {
                tracing::debug!(stream_id = %stream_id, "Ending UI event stream for shutdown");
                break;
            }

            let item = tokio::select! {
                item = events.next() => item,
                changed = closing.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };
            let Some(item) = item else {
                break;
            };

            let event = match item {
                Ok(ui_event) => to_sse_event(&ui_event),
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    tracing::warn!(stream_id = %stream_id, missed = missed, "UI stream lagged");
                    let json = serde_json::to_string(&StreamEvent::Lagged { missed })
                        .unwrap_or_default();
                    Event::default().event("lagged").data(json)
                }
            };
            yield Ok(event);
        }
    }
}

fn to_sse_event(ui_event: &UiEvent) -> Event {
    match serde_json::to_string(ui_event) {
        Ok(json) => Event::default().event(ui_event.kind()).data(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize UI event");
            Event::default()
                .event("error")
                .data(format!(r#"{{"code":"SERIALIZATION_ERROR","message":"{}"}}"#, e))
        }
    }
}

struct StreamGuard {
    stream_id: Uuid,
    opened_at: std::time::Instant,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        tracing::info!(
            stream_id = %self.stream_id,
            duration_secs = self.opened_at.elapsed().as_secs_f64(),
            "UI event stream closed"
        );
    }
}
