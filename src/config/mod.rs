mod settings;

pub use settings::{
    ApiConfig, ConnectivityConfig, OtelConfig, QueueConfig, ReconnectConfig, ServerConfig,
    Settings, TransportConfig, TransportKind,
};
