use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Keep-alive interval for the UI event stream in seconds
    #[serde(default = "default_stream_keepalive")]
    pub stream_keepalive_secs: u64,
    /// How long shutdown waits for the queue to empty, in seconds
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

/// Delivery queue tuning. Delays are global, not per transport.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Consecutive failed attempts before an event is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed wait before re-attempting the head event, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Age (from enqueue) after which an unattempted event is discarded
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    /// Pause after each successful delivery, in milliseconds
    #[serde(default = "default_inter_message_delay_ms")]
    pub inter_message_delay_ms: u64,
    /// Hold new events instead of draining while the connectivity signal is offline
    #[serde(default)]
    pub defer_while_offline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Websocket,
    Bridge,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_transport_kind")]
    pub kind: TransportKind,
    /// Backend base URL for the HTTP transport
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path appended to `base_url` for every delivery
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// WebSocket URL; derived from `base_url` when unset
    pub ws_url: Option<String>,
    /// Chat identifier attached to HTTP deliveries
    pub chat_id: Option<i64>,
    #[serde(default)]
    pub tts_enabled: bool,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_base_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_reconnect_cap_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0)
    #[serde(default)]
    pub jitter_factor: f64,
    /// Give up after this many consecutive failures; unlimited when unset
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
    /// Initial value of the online flag
    #[serde(default = "default_true")]
    pub initially_online: bool,
    /// URL polled to derive the online flag; probing is off when unset
    pub probe_url: Option<String>,
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
    /// Emit JSON log lines instead of the human-readable format
    #[serde(default)]
    pub json_logs: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_stream_keepalive() -> u64 {
    15
}

fn default_drain_timeout() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_message_timeout_ms() -> u64 {
    30_000
}

fn default_inter_message_delay_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_transport_kind() -> TransportKind {
    TransportKind::Http
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_endpoint() -> String {
    "/api/message".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_cap_ms() -> u64 {
    30_000
}

fn default_probe_interval() -> u64 {
    10
}

fn default_probe_timeout_ms() -> u64 {
    3000
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "aris-relay".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("queue.max_retries", i64::from(default_max_retries()))?
            .set_default("queue.retry_delay_ms", default_retry_delay_ms() as i64)?
            .set_default("queue.message_timeout_ms", default_message_timeout_ms() as i64)?
            .set_default("queue.inter_message_delay_ms", default_inter_message_delay_ms() as i64)?
            .set_default("transport.kind", "http")?
            .set_default("transport.base_url", default_base_url())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // RELAY__QUEUE__MAX_RETRIES, RELAY__TRANSPORT__KIND, ...
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            stream_keepalive_secs: default_stream_keepalive(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

impl QueueConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn inter_message_delay(&self) -> Duration {
        Duration::from_millis(self.inter_message_delay_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            message_timeout_ms: default_message_timeout_ms(),
            inter_message_delay_ms: default_inter_message_delay_ms(),
            defer_while_offline: false,
        }
    }
}

impl TransportConfig {
    /// WebSocket endpoint, falling back to `base_url` with its scheme swapped and `/ws` appended
    pub fn websocket_url(&self) -> String {
        match &self.ws_url {
            Some(url) => url.clone(),
            None => {
                let base = self.base_url.trim_end_matches('/');
                let swapped = if let Some(rest) = base.strip_prefix("https") {
                    format!("wss{}", rest)
                } else if let Some(rest) = base.strip_prefix("http") {
                    format!("ws{}", rest)
                } else {
                    base.to_string()
                };
                format!("{}/ws", swapped)
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            base_url: default_base_url(),
            endpoint: default_endpoint(),
            ws_url: None,
            chat_id: None,
            tts_enabled: false,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_reconnect_base_ms(),
            max_delay_ms: default_reconnect_cap_ms(),
            jitter_factor: 0.0,
            max_attempts: None,
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            initially_online: true,
            probe_url: None,
            probe_interval_secs: default_probe_interval(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
            json_logs: false,
        }
    }
}
