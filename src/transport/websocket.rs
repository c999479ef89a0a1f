use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{DeliveryError, Transport, WireEnvelope};
use crate::config::ReconnectConfig;
use crate::queue::QueuedEvent;
use crate::reconnect::{ConnectionState, ReconnectMachine};
use crate::ui::{Severity, UiChannel, UiSink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Write half, present only while connected
struct Shared {
    sink: Mutex<Option<WsSink>>,
}

/// Sends each event as a text frame over a persistent socket.
///
/// Delivery is fire-and-forget: a frame that was written counts as delivered.
/// While the socket is down every delivery fails with `NotConnected` and the
/// queue's retry path takes over.
pub struct WebSocketTransport {
    shared: Arc<Shared>,
    state: watch::Receiver<ConnectionState>,
    send_timeout: Duration,
}

/// Default bound on writing one frame
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the connection and runs the reconnect loop.
pub struct WebSocketSupervisor {
    url: String,
    shared: Arc<Shared>,
    machine: ReconnectMachine,
    ui: Option<UiChannel>,
}

impl WebSocketTransport {
    /// Build the transport and the supervisor that must be spawned to drive it
    pub fn new(
        url: impl Into<String>,
        reconnect: &ReconnectConfig,
        ui: Option<UiChannel>,
    ) -> (Self, WebSocketSupervisor) {
        let shared = Arc::new(Shared {
            sink: Mutex::new(None),
        });
        let machine = ReconnectMachine::from_config(reconnect);
        let transport = Self {
            shared: shared.clone(),
            state: machine.subscribe(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        };
        let supervisor = WebSocketSupervisor {
            url: url.into(),
            shared,
            machine,
            ui,
        };
        (transport, supervisor)
    }

    /// Bound each frame write; a send that stalls drops the write half
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn deliver(&self, event: &QueuedEvent) -> Result<(), DeliveryError> {
        if self.state() != ConnectionState::Connected {
            return Err(DeliveryError::NotConnected);
        }

        let frame = WireEnvelope::new(event).to_json()?;

        let mut guard = self.shared.sink.lock().await;
        let sink = guard.as_mut().ok_or(DeliveryError::NotConnected)?;
        let sent = tokio::time::timeout(self.send_timeout, sink.send(Message::Text(frame))).await;
        match sent {
            Ok(sent) => {
                sent?;
                Ok(())
            }
            Err(_) => {
                // Half-open socket: later deliveries fail fast until the supervisor reconnects
                guard.take();
                tracing::warn!(
                    event_id = %event.id,
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "WebSocket send stalled, dropping write half"
                );
                Err(DeliveryError::SendTimeout(self.send_timeout))
            }
        }
    }
}

impl WebSocketSupervisor {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.machine.subscribe()
    }

    /// Connect, read until the socket drops, back off, repeat.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(url = %self.url, "WebSocket supervisor started");

        loop {
            self.machine.begin_connect();

            let connected = tokio::select! {
                _ = shutdown.recv() => break,
                result = connect_async(self.url.as_str()) => result,
            };

            match connected {
                Ok((stream, _)) => {
                    let (sink, source) = stream.split();
                    *self.shared.sink.lock().await = Some(sink);
                    self.machine.connected();
                    tracing::info!(url = %self.url, "WebSocket connected");

                    if self.read_until_closed(source, &mut shutdown).await {
                        break;
                    }
                    self.shared.sink.lock().await.take();
                    tracing::warn!(url = %self.url, "WebSocket connection closed");
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "WebSocket connect failed");
                }
            }

            let Some(delay) = self.machine.failed() else {
                tracing::error!(
                    url = %self.url,
                    attempts = self.machine.attempt(),
                    "Reconnect attempts exhausted, giving up"
                );
                if let Some(ui) = &self.ui {
                    ui.notify("Connection to server lost", Severity::Error);
                }
                break;
            };

            tracing::info!(
                attempt = self.machine.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            if let Some(ui) = &self.ui {
                ui.notify(
                    &format!("Reconnecting in {}s", delay.as_secs().max(1)),
                    Severity::Warning,
                );
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if let Some(mut sink) = self.shared.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.machine.closed();
        tracing::info!("WebSocket supervisor stopped");
    }

    /// Returns `true` when interrupted by shutdown, `false` when the socket dropped
    async fn read_until_closed(
        &self,
        mut source: WsSource,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> bool {
        loop {
            tokio::select! {
                _ = shutdown.recv() => return true,
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_inbound(&text),
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket read error");
                        return false;
                    }
                },
            }
        }
    }

    fn handle_inbound(&self, text: &str) {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => {
                if let Some(ui) = &self.ui {
                    ui.reply(value);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse inbound WebSocket message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::EventPayload;
    use crate::ui::UiEvent;
    use tokio::net::TcpListener;

    fn fast_reconnect() -> ReconnectConfig {
        ReconnectConfig {
            base_delay_ms: 20,
            max_delay_ms: 100,
            jitter_factor: 0.0,
            max_attempts: None,
        }
    }

    async fn wait_for(rx: &mut watch::Receiver<ConnectionState>, wanted: ConnectionState) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while *rx.borrow_and_update() != wanted {
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("state not reached in time");
    }

    #[tokio::test]
    async fn test_deliver_fails_while_disconnected() {
        let (transport, _supervisor) =
            WebSocketTransport::new("ws://127.0.0.1:1/ws", &fast_reconnect(), None);

        let err = transport
            .deliver(&QueuedEvent::new(EventPayload::message("hi")))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::NotConnected));
    }

    #[tokio::test]
    async fn test_delivers_frames_and_forwards_replies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let frame = ws.next().await.unwrap().unwrap();
            ws.send(Message::Text(r#"{"response":"pong"}"#.to_string()))
                .await
                .unwrap();
            // Keep the socket open until the client is done
            let _ = ws.next().await;
            frame
        });

        let ui = UiChannel::new();
        let mut ui_rx = ui.subscribe();
        let (transport, supervisor) = WebSocketTransport::new(
            format!("ws://{}/ws", addr),
            &fast_reconnect(),
            Some(ui),
        );
        let mut state = transport.subscribe_state();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(supervisor.run(shutdown_rx));

        wait_for(&mut state, ConnectionState::Connected).await;
        transport
            .deliver(&QueuedEvent::new(EventPayload::message("ping")))
            .await
            .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), ui_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(reply, UiEvent::Reply { ref payload, .. } if payload["response"] == "pong"));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        let frame = server.await.unwrap();
        let json: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["content"], "ping");
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnects_after_server_drops_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted_tx, mut accepted_rx) = tokio::sync::mpsc::channel(1);

        tokio::spawn(async move {
            // First connection is closed straight away, second one is kept
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.close(None).await.unwrap();
            drop(ws);

            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            accepted_tx.send(()).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let (transport, supervisor) =
            WebSocketTransport::new(format!("ws://{}/ws", addr), &fast_reconnect(), None);
        let mut state = transport.subscribe_state();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(supervisor.run(shutdown_rx));

        tokio::time::timeout(Duration::from_secs(5), accepted_rx.recv())
            .await
            .expect("client should reconnect")
            .unwrap();
        wait_for(&mut state, ConnectionState::Connected).await;

        transport
            .deliver(&QueuedEvent::new(EventPayload::message("after reconnect")))
            .await
            .unwrap();

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let config = ReconnectConfig {
            max_attempts: Some(2),
            ..fast_reconnect()
        };
        let (transport, supervisor) =
            WebSocketTransport::new(format!("ws://{}/ws", addr), &config, None);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tokio::time::timeout(Duration::from_secs(5), supervisor.run(shutdown_rx))
            .await
            .expect("supervisor should stop after exhausting attempts");
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stalled_send_times_out_and_drops_sink() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            // Handshake, then never read so the client's send buffer fills up
            let _ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _ = release_rx.await;
        });

        let (transport, supervisor) =
            WebSocketTransport::new(format!("ws://{}/ws", addr), &fast_reconnect(), None);
        let transport = transport.with_send_timeout(Duration::from_millis(100));
        let mut state = transport.subscribe_state();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(supervisor.run(shutdown_rx));
        wait_for(&mut state, ConnectionState::Connected).await;

        let big = "x".repeat(512 * 1024);
        let mut outcome = None;
        for _ in 0..400 {
            if let Err(e) = transport
                .deliver(&QueuedEvent::new(EventPayload::message(big.clone())))
                .await
            {
                outcome = Some(e);
                break;
            }
        }
        assert!(matches!(outcome, Some(DeliveryError::SendTimeout(_))));

        let next = transport
            .deliver(&QueuedEvent::new(EventPayload::message("after stall")))
            .await
            .unwrap_err();
        assert!(matches!(next, DeliveryError::NotConnected));

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("supervisor should stop while the socket is stalled")
            .unwrap();
        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn test_wss_urls_attempt_a_tls_handshake() {
        use tokio_tungstenite::tungstenite::{error::UrlError, Error as WsError};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Plain TCP peer: the TLS handshake fails, but only after it was attempted
            let (tcp, _) = listener.accept().await.unwrap();
            drop(tcp);
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            connect_async(format!("wss://{}/ws", addr)),
        )
        .await
        .expect("connect should fail promptly");

        let err = result.err().expect("plain TCP peer cannot complete TLS");
        assert!(!matches!(err, WsError::Url(UrlError::TlsFeatureNotEnabled)));
    }
}
