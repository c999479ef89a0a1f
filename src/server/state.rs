use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::config::Settings;
use crate::connectivity::ConnectivitySignal;
use crate::queue::DeliveryQueue;
use crate::reconnect::ConnectionState;
use crate::ui::UiChannel;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub queue: DeliveryQueue,
    pub connectivity: ConnectivitySignal,
    pub ui: UiChannel,
    /// Present when the transport keeps a persistent connection
    pub connection_state: Option<watch::Receiver<ConnectionState>>,
    /// Flipped to `true` once to end open UI event streams
    pub streams_closing: Arc<watch::Sender<bool>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        queue: DeliveryQueue,
        connectivity: ConnectivitySignal,
        ui: UiChannel,
        connection_state: Option<watch::Receiver<ConnectionState>>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            queue,
            connectivity,
            ui,
            connection_state,
            streams_closing: Arc::new(watch::channel(false).0),
            start_time: Instant::now(),
        }
    }

    /// End every open UI event stream so the HTTP server can finish its graceful shutdown.
    ///
    /// Streams opened afterwards close right after their `connected` event.
    pub fn close_streams(&self) {
        self.streams_closing.send_replace(true);
        tracing::info!(
            open_streams = self.streams_closing.receiver_count(),
            "Closing UI event streams"
        );
    }
}
