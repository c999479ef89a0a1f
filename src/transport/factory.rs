//! Transport factory

use std::sync::Arc;

use reqwest::Url;
use tokio::sync::watch;

use super::{BridgeTransport, HttpTransport, Transport, TransportError, WebSocketSupervisor, WebSocketTransport};
use crate::config::{ReconnectConfig, TransportConfig, TransportKind};
use crate::reconnect::ConnectionState;
use crate::ui::UiChannel;

/// A transport plus whatever the caller must keep running for it
pub struct TransportSet {
    pub transport: Arc<dyn Transport>,
    /// State of the persistent connection, for transports that keep one
    pub connection_state: Option<watch::Receiver<ConnectionState>>,
    /// Must be spawned for the WebSocket transport to ever connect
    pub supervisor: Option<WebSocketSupervisor>,
}

/// Create the transport selected by `config.kind`.
///
/// - `http`: `HttpTransport` posting to `base_url + endpoint`
/// - `websocket`: `WebSocketTransport` on `ws_url` (or derived from `base_url`)
/// - `bridge`: `BridgeTransport` writing JSON lines to stdout
pub fn create_transport(
    config: &TransportConfig,
    reconnect: &ReconnectConfig,
    ui: UiChannel,
) -> Result<TransportSet, TransportError> {
    match config.kind {
        TransportKind::Http => {
            let transport = HttpTransport::new(config, Some(ui))?;
            tracing::info!(transport = "http", url = %transport.url(), "Creating HTTP transport");
            Ok(TransportSet {
                transport: Arc::new(transport),
                connection_state: None,
                supervisor: None,
            })
        }
        TransportKind::Websocket => {
            let url = config.websocket_url();
            Url::parse(&url).map_err(|e| TransportError::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;

            tracing::info!(
                transport = "websocket",
                url = %url,
                base_delay_ms = reconnect.base_delay_ms,
                max_delay_ms = reconnect.max_delay_ms,
                "Creating WebSocket transport"
            );
            let (transport, supervisor) = WebSocketTransport::new(url, reconnect, Some(ui));
            let transport = transport.with_send_timeout(config.request_timeout());
            Ok(TransportSet {
                connection_state: Some(transport.subscribe_state()),
                transport: Arc::new(transport),
                supervisor: Some(supervisor),
            })
        }
        TransportKind::Bridge => {
            tracing::info!(transport = "bridge", "Creating host bridge transport on stdout");
            Ok(TransportSet {
                transport: Arc::new(BridgeTransport::stdout()),
                connection_state: None,
                supervisor: None,
            })
        }
    }
}
